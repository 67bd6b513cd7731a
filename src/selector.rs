//! Window selection
//!
//! Applies the admission predicate to candidate windows and keeps the single
//! best window of every segment. Selection is per segment, not global: each
//! qualifying segment of an activity yields at most one window.

use crate::types::Window;
use std::cmp::Ordering;

/// Picks one best window per segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSelector {
    /// Minimum admission heart rate (bpm)
    min_gate_hr: f64,
}

impl WindowSelector {
    pub fn new(min_gate_hr: f64) -> Self {
        Self { min_gate_hr }
    }

    /// Admission threshold as a fraction of the athlete's max HR
    pub fn from_fraction(max_hr: f64, fraction: f64) -> Self {
        Self::new(fraction * max_hr)
    }

    pub fn min_gate_hr(&self) -> f64 {
        self.min_gate_hr
    }

    /// Whether a window is valid and passes the admission predicate
    pub fn admits(&self, window: &Window) -> bool {
        window.metric_value.is_finite()
            && window.metric_value >= 0.0
            && window
                .gate_hr
                .is_some_and(|hr| hr.is_finite() && hr >= self.min_gate_hr)
    }

    /// Select the largest-valued admitted window of every segment.
    ///
    /// Candidates must arrive in original row order; ties keep the earliest
    /// window because the sort is stable.
    pub fn select(&self, candidates: Vec<Window>) -> Vec<Window> {
        let mut admitted: Vec<Window> = candidates
            .into_iter()
            .filter(|window| self.admits(window))
            .collect();

        admitted.sort_by(|a, b| {
            a.segment_id.cmp(&b.segment_id).then_with(|| {
                b.metric_value
                    .partial_cmp(&a.metric_value)
                    .unwrap_or(Ordering::Equal)
            })
        });
        admitted.dedup_by_key(|window| window.segment_id);
        admitted
    }
}
