//! Ride Signals - Physiological performance features from per-second ride data
//!
//! Extracts heart-rate recovery (HRR), maximal mean power (MMP) and training
//! impulse (TRIMP) from noisy, gapped heart rate and power streams through a
//! deterministic pipeline: segmentation → outlier filtering → rolling
//! aggregation → per-segment window selection → feature assembly.
//!
//! ## Modules
//!
//! - **Signal chain**: `segment`, `filter`, `rolling`, `selector`
//! - **Extraction**: `features` (per activity), `baseline` (per athlete),
//!   `pipeline` (across activities and athletes)
//! - **I/O**: `adapters` (athlete providers), `encoder` (reports)

pub mod adapters;
pub mod baseline;
pub mod config;
pub mod encoder;
pub mod error;
pub mod features;
pub mod filter;
pub mod pipeline;
pub mod rolling;
pub mod segment;
pub mod selector;
pub mod types;

pub use adapters::{DataProvider, InMemoryProvider};
pub use baseline::{AthleteCalibrator, CalibrationState};
pub use config::PipelineConfig;
pub use encoder::{FeatureEncoder, FeatureReport};
pub use error::ComputeError;
pub use pipeline::{aggregate_weekly, extract_features, AthleteFeatures, AthleteProcessor};
pub use types::{Activity, Athlete, AthleteBaseline, FeatureRow, FeatureTable, Gender, Metric, Sample};

/// Crate version embedded in all reports
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "ride-signals";
