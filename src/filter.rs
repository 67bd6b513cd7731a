//! Outlier filtering
//!
//! Heart-rate straps produce sporadic single-sample spikes and dropouts. The
//! Hampel filter compares every point with the median of its neighbourhood and
//! replaces it with that median when it deviates by more than `n_sigma` scaled
//! median absolute deviations. Being rank based, it ignores spike magnitude.

use crate::config::FilterConfig;
use crate::error::ComputeError;
use crate::types::Segment;
use std::cmp::Ordering;

/// Scales the MAD to a standard deviation under normality
pub const MAD_SCALE: f64 = 1.4826;

/// Windowed median/MAD outlier detector and corrector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HampelFilter {
    half_window: usize,
    n_sigma: f64,
}

impl Default for HampelFilter {
    fn default() -> Self {
        Self::from_config(&FilterConfig::default())
    }
}

impl HampelFilter {
    pub fn new(half_window: usize, n_sigma: f64) -> Self {
        Self {
            half_window,
            n_sigma,
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.half_window, config.n_sigma)
    }

    pub fn half_window(&self) -> usize {
        self.half_window
    }

    /// Full window width: the centre plus `half_window` on each side
    pub fn window_size(&self) -> usize {
        self.half_window.saturating_mul(2).saturating_add(1)
    }

    /// Filter a sequence, returning a same-length output.
    ///
    /// The first and last `half_window` points have no full window and are
    /// emitted as missing, as is any missing or non-finite input point. When
    /// the input is shorter than one full window the output is all missing.
    pub fn apply(&self, values: &[Option<f64>]) -> Vec<Option<f64>> {
        let n = values.len();
        let mut filtered = vec![None; n];
        let window_size = self.window_size();

        if n < window_size {
            return filtered;
        }

        let mut window: Vec<f64> = Vec::with_capacity(window_size);
        let mut deviations: Vec<f64> = Vec::with_capacity(window_size);

        for i in self.half_window..(n - self.half_window) {
            let Some(current) = values[i].filter(|v| v.is_finite()) else {
                continue;
            };

            window.clear();
            window.extend(
                values[i - self.half_window..=i + self.half_window]
                    .iter()
                    .flatten()
                    .copied()
                    .filter(|v| v.is_finite()),
            );
            let window_median = median(&mut window);

            deviations.clear();
            deviations.extend(window.iter().map(|v| (v - window_median).abs()));
            let mad = median(&mut deviations);

            let threshold = self.n_sigma * MAD_SCALE * mad;
            filtered[i] = if (current - window_median).abs() > threshold {
                Some(window_median)
            } else {
                Some(current)
            };
        }

        filtered
    }

    /// Filter the heart rate of one segment and drop its edge rows.
    ///
    /// The first and last `half_window` rows of the segment are removed rather
    /// than estimated from a partial window, so the returned segment is
    /// `2 * half_window` rows shorter and keeps the same id.
    pub fn filter_segment(&self, segment: &Segment) -> Result<Segment, ComputeError> {
        if segment.len() < self.window_size() {
            return Err(ComputeError::InsufficientLength(format!(
                "segment {} has {} samples, filter needs {}",
                segment.id,
                segment.len(),
                self.window_size()
            )));
        }

        let filtered_hr = self.apply(&segment.hr());
        let interior = self.half_window..segment.len() - self.half_window;

        let samples = segment.samples[interior.clone()]
            .iter()
            .zip(&filtered_hr[interior])
            .map(|(sample, hr)| {
                let mut sample = *sample;
                sample.hr = *hr;
                sample
            })
            .collect();

        Ok(Segment {
            id: segment.id,
            samples,
        })
    }
}

/// Upper median of a non-empty slice (sorts in place)
fn median(values: &mut [f64]) -> f64 {
    debug_assert!(!values.is_empty(), "median of empty window");
    values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    values[values.len() / 2]
}
