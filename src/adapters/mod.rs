//! Athlete data providers
//!
//! The pipeline never loads data on its own. Callers inject a provider that
//! hands out fully materialized athletes; retrieval and caching stay on the
//! provider's side of this trait.

mod memory;

pub use memory::InMemoryProvider;

use crate::error::ComputeError;
use crate::types::Athlete;

/// Read-only source of athletes and their activities
pub trait DataProvider {
    /// Load one athlete with all of their activities
    fn get_athlete(&self, athlete_id: &str) -> Result<Athlete, ComputeError>;

    /// Ids of every athlete this provider knows about, sorted ascending
    fn list_athletes(&self) -> Vec<String>;
}
