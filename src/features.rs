//! Per-activity feature extraction
//!
//! This module runs the signal chain for one activity:
//! - Heart-rate recovery (largest HR drop over a fixed window after hard effort)
//! - Maximal mean power (largest rolling mean power at near-maximal HR)
//! - Training impulse (duration and intensity weighted load)
//!
//! Windowed metrics share one chain: segment → filter HR per segment → rolling
//! aggregate per segment → select the best admitted window per segment.

use crate::config::{mmp_window_samples, PipelineConfig};
use crate::error::ComputeError;
use crate::filter::HampelFilter;
use crate::rolling::{negated_diff, RollingAggregator};
use crate::segment::SegmentBuilder;
use crate::selector::WindowSelector;
use crate::types::{AthleteBaseline, Gender, Metric, Sample, Segment, Window};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Best windows of one activity for a windowed metric
pub fn metric_windows(
    metric: &Metric,
    samples: &[Sample],
    max_hr: f64,
    config: &PipelineConfig,
) -> Result<Vec<Window>, ComputeError> {
    match *metric {
        Metric::Hrr { window_len } => hrr_windows(samples, max_hr, window_len, config),
        Metric::MaxMeanPower {
            window_minutes,
            hr_threshold,
        } => mmp_windows(samples, max_hr, window_minutes, hr_threshold, config),
    }
}

/// Heart-rate recovery windows of one activity.
///
/// Only recovery rows are considered: HR at or above `min_valid_hr` and, when
/// a power cap is configured, power at or below it. The metric of a window
/// ending at row `i` is the rolling sum of per-row HR drops over `window_len`
/// rows; it is admitted when the HR at the window start reaches
/// `start_hr_fraction * max_hr`.
pub fn hrr_windows(
    samples: &[Sample],
    max_hr: f64,
    window_len: usize,
    config: &PipelineConfig,
) -> Result<Vec<Window>, ComputeError> {
    if !samples.iter().any(|s| s.hr.is_some_and(f64::is_finite)) {
        return Err(ComputeError::MissingData("no heart rate stream".to_string()));
    }

    let recovery: Vec<Sample> = samples
        .iter()
        .filter(|s| is_recovery_row(s, config))
        .copied()
        .collect();

    let segments = SegmentBuilder::new(window_len)
        .build(&recovery)
        .into_segments()?;

    let filter = HampelFilter::from_config(&config.filter);
    let aggregator = RollingAggregator::sum(window_len);
    let mut candidates = Vec::new();

    for segment in filtered_segments(&filter, &segments) {
        let hr = segment.hr();
        let drops = aggregator.apply(&negated_diff(&hr));

        for (end, drop) in drops.iter().enumerate() {
            let Some(drop) = *drop else { continue };
            let start = end + 1 - window_len;
            candidates.push(Window {
                segment_id: segment.id,
                start_secs: segment.samples[start].secs,
                end_secs: segment.samples[end].secs,
                metric_value: drop,
                gate_hr: hr[start],
            });
        }
    }

    let selector = WindowSelector::from_fraction(max_hr, config.hrr.start_hr_fraction);
    Ok(selector.select(candidates))
}

/// Maximal mean power windows of one activity.
///
/// The window is `window_minutes * 60` samples; it is admitted when the
/// rolling mean HR over the window reaches `hr_threshold * max_hr`.
pub fn mmp_windows(
    samples: &[Sample],
    max_hr: f64,
    window_minutes: usize,
    hr_threshold: f64,
    config: &PipelineConfig,
) -> Result<Vec<Window>, ComputeError> {
    if !samples.iter().any(|s| s.hr.is_some_and(f64::is_finite)) {
        return Err(ComputeError::MissingData("no heart rate stream".to_string()));
    }
    if !samples.iter().any(|s| s.power.is_some_and(f64::is_finite)) {
        return Err(ComputeError::MissingData("no power stream".to_string()));
    }

    let width = mmp_window_samples(window_minutes)?;
    let segments = SegmentBuilder::new(width).build(samples).into_segments()?;

    let filter = HampelFilter::from_config(&config.filter);
    let aggregator = RollingAggregator::mean(width);
    let mut candidates = Vec::new();

    for segment in filtered_segments(&filter, &segments) {
        let mean_power = aggregator.apply(&segment.power());
        let mean_hr = aggregator.apply(&segment.hr());

        for (end, (power, hr)) in mean_power.iter().zip(&mean_hr).enumerate() {
            let Some(power) = *power else { continue };
            let start = end + 1 - width;
            candidates.push(Window {
                segment_id: segment.id,
                start_secs: segment.samples[start].secs,
                end_secs: segment.samples[end].secs,
                metric_value: power,
                gate_hr: *hr,
            });
        }
    }

    let selector = WindowSelector::from_fraction(max_hr, hr_threshold);
    Ok(selector.select(candidates))
}

/// Outlier-corrected segments with their edge rows removed; segments too
/// short to filter are skipped.
fn filtered_segments(filter: &HampelFilter, segments: &[Segment]) -> Vec<Segment> {
    segments
        .iter()
        .filter_map(|segment| match filter.filter_segment(segment) {
            Ok(filtered) => Some(filtered),
            Err(e) => {
                debug!(segment_id = segment.id, error = %e, "skipping segment");
                None
            }
        })
        .collect()
}

fn is_recovery_row(sample: &Sample, config: &PipelineConfig) -> bool {
    let hr_ok = sample
        .hr
        .is_some_and(|hr| hr.is_finite() && hr >= config.min_valid_hr);
    let power_ok = match config.hrr.max_power_watts {
        Some(cap) => sample.power.is_some_and(|p| p.is_finite() && p <= cap),
        None => true,
    };
    hr_ok && power_ok
}

/// Training impulse of one activity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimpScore {
    pub duration_minutes: f64,
    pub mean_hr: f64,
    pub trimp: f64,
}

/// Banister-style training impulse:
/// `duration_minutes * (mean_hr - min_hr) / (max_hr - min_hr) * weight`
pub fn trimp(duration_minutes: f64, mean_hr: f64, baseline: &AthleteBaseline, weight: f64) -> f64 {
    let reserve_fraction = (mean_hr - baseline.min_hr) / (baseline.max_hr - baseline.min_hr);
    duration_minutes * reserve_fraction * weight
}

/// TRIMP of one activity over its valid HR samples (HR ≥ `min_valid_hr`).
pub fn activity_trimp(
    samples: &[Sample],
    baseline: &AthleteBaseline,
    gender: Gender,
    config: &PipelineConfig,
) -> Result<TrimpScore, ComputeError> {
    if baseline.max_hr <= baseline.min_hr {
        return Err(ComputeError::InvalidParameter(format!(
            "max HR {} must exceed min HR {}",
            baseline.max_hr, baseline.min_hr
        )));
    }

    let valid: Vec<f64> = samples
        .iter()
        .filter_map(|s| s.hr)
        .filter(|hr| hr.is_finite() && *hr >= config.min_valid_hr)
        .collect();

    if valid.is_empty() {
        return Err(ComputeError::MissingData("no valid heart rate samples".to_string()));
    }

    let duration_minutes = valid.len() as f64 / 60.0;
    let mean_hr = valid.iter().sum::<f64>() / valid.len() as f64;

    Ok(TrimpScore {
        duration_minutes,
        mean_hr,
        trimp: trimp(duration_minutes, mean_hr, baseline, config.trimp.weight(gender)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MAX_HR: f64 = 190.0;

    /// Plateau at 160, a 50 bpm drop at 2 bpm per second, then a plateau at 110
    fn recovery_ride(start: i64) -> Vec<Sample> {
        let mut hr = vec![160.0; 40];
        hr.extend((1..=25).map(|i| 160.0 - 2.0 * i as f64));
        hr.extend(vec![110.0; 40]);
        hr.into_iter()
            .enumerate()
            .map(|(i, hr)| Sample::new(start + i as i64, Some(hr), Some(0.0)))
            .collect()
    }

    #[test]
    fn test_hrr_single_window_with_full_drop() {
        let config = PipelineConfig::default();
        let windows = hrr_windows(&recovery_ride(0), MAX_HR, 30, &config).unwrap();

        assert_eq!(windows.len(), 1);
        let window = windows[0];
        assert_eq!(window.metric_value, 50.0);
        assert_eq!(window.end_secs - window.start_secs, 29);
        assert!(window.gate_hr.unwrap() >= 0.8 * MAX_HR);
        // Earliest window covering the whole drop: deltas at rows 40..=64
        assert_eq!(window.end_secs, 64);
    }

    #[test]
    fn test_hrr_drop_from_150_to_100_over_30_samples() {
        // Plateau at 150, then 29 steps down to 100 (8 of 1 bpm, 21 of 2 bpm)
        let mut hr = vec![150.0; 40];
        let mut current = 150.0;
        for step in 0..29 {
            current -= if step < 8 { 1.0 } else { 2.0 };
            hr.push(current);
        }
        assert_eq!(current, 100.0);
        hr.extend(vec![100.0; 40]);
        let samples: Vec<Sample> = hr
            .into_iter()
            .enumerate()
            .map(|(i, hr)| Sample::new(i as i64, Some(hr), Some(0.0)))
            .collect();

        // 150 >= 0.8 * 185
        let windows = hrr_windows(&samples, 185.0, 30, &PipelineConfig::default()).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].metric_value, 50.0);
        // Starts on the last 150 sample and ends on the first 100 sample
        assert_eq!((windows[0].start_secs, windows[0].end_secs), (39, 68));
        assert_eq!(windows[0].gate_hr, Some(150.0));
    }

    #[test]
    fn test_hrr_one_row_per_segment() {
        let config = PipelineConfig::default();
        let mut samples = recovery_ride(0);
        samples.extend(recovery_ride(1_000));
        let windows = hrr_windows(&samples, MAX_HR, 30, &config).unwrap();

        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].segment_id, 0);
        assert_eq!(windows[1].segment_id, 1);
        assert!(windows.iter().all(|w| w.metric_value == 50.0));
    }

    #[test]
    fn test_hrr_pedalling_rows_excluded() {
        let config = PipelineConfig::default();
        let samples: Vec<Sample> = recovery_ride(0)
            .into_iter()
            .map(|mut s| {
                s.power = Some(250.0);
                s
            })
            .collect();
        assert!(matches!(
            hrr_windows(&samples, MAX_HR, 30, &config),
            Err(ComputeError::MissingData(_)) | Err(ComputeError::InsufficientLength(_))
        ));
    }

    #[test]
    fn test_hrr_low_start_not_admitted() {
        let config = PipelineConfig::default();
        let windows = hrr_windows(&recovery_ride(0), 220.0, 30, &config).unwrap();
        assert!(windows.is_empty());
    }

    #[test]
    fn test_hrr_missing_stream() {
        let config = PipelineConfig::default();
        let samples: Vec<Sample> = (0..100).map(|i| Sample::new(i, None, Some(0.0))).collect();
        assert!(matches!(
            hrr_windows(&samples, MAX_HR, 30, &config),
            Err(ComputeError::MissingData(_))
        ));
    }

    fn effort_ride(minutes: usize, watts: f64, hr: f64) -> Vec<Sample> {
        (0..minutes * 60)
            .map(|i| Sample::new(i as i64, Some(hr), Some(watts)))
            .collect()
    }

    #[test]
    fn test_mmp_selects_hardest_block() {
        let config = PipelineConfig::default();
        let mut samples = effort_ride(4, 200.0, 170.0);
        for (i, sample) in samples.iter_mut().enumerate() {
            if (120..180).contains(&i) {
                sample.power = Some(350.0);
            }
        }

        let windows = mmp_windows(&samples, MAX_HR, 1, 0.85, &config).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].metric_value, 350.0);
        assert_eq!((windows[0].start_secs, windows[0].end_secs), (120, 179));
    }

    #[test]
    fn test_mmp_hr_threshold_gate() {
        let config = PipelineConfig::default();
        let samples = effort_ride(3, 300.0, 140.0);
        let windows = mmp_windows(&samples, MAX_HR, 1, 0.85, &config).unwrap();
        assert!(windows.is_empty());
    }

    #[test]
    fn test_mmp_missing_power_invalidates_window() {
        let config = PipelineConfig::default();
        let mut samples = effort_ride(2, 300.0, 175.0);
        for sample in samples.iter_mut().skip(30).step_by(40) {
            sample.power = None;
        }
        let windows = mmp_windows(&samples, MAX_HR, 1, 0.85, &config).unwrap();
        assert!(windows.is_empty());
    }

    #[test]
    fn test_mmp_overlong_window_rejected() {
        let config = PipelineConfig::default();
        let samples = effort_ride(2, 300.0, 175.0);
        assert!(matches!(
            mmp_windows(&samples, MAX_HR, usize::MAX / 30, 0.85, &config),
            Err(ComputeError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_mmp_short_activity() {
        let config = PipelineConfig::default();
        let samples = effort_ride(1, 300.0, 175.0);
        assert!(matches!(
            mmp_windows(&samples[..59], MAX_HR, 1, 0.85, &config),
            Err(ComputeError::InsufficientLength(_))
        ));
    }

    #[test]
    fn test_trimp_formula() {
        let baseline = AthleteBaseline {
            max_hr: 190.0,
            min_hr: 50.0,
        };
        let value = trimp(60.0, 150.0, &baseline, 1.92);
        assert!((value - 82.2857).abs() < 1e-3);
    }

    #[test]
    fn test_activity_trimp_uses_valid_samples_only() {
        let config = PipelineConfig::default();
        let baseline = AthleteBaseline {
            max_hr: 190.0,
            min_hr: 50.0,
        };
        let mut samples: Vec<Sample> = (0..3600).map(|i| Sample::new(i, Some(150.0), None)).collect();
        samples.extend((3600..3700).map(|i| Sample::new(i, Some(0.0), None)));
        samples.push(Sample::new(3700, None, None));

        let score = activity_trimp(&samples, &baseline, Gender::Male, &config).unwrap();
        assert_eq!(score.duration_minutes, 60.0);
        assert_eq!(score.mean_hr, 150.0);
        assert!((score.trimp - 82.2857).abs() < 1e-3);

        let female = activity_trimp(&samples, &baseline, Gender::Female, &config).unwrap();
        assert!((female.trimp - 60.0 * (100.0 / 140.0) * 1.67).abs() < 1e-9);
    }

    #[test]
    fn test_activity_trimp_errors() {
        let config = PipelineConfig::default();
        let baseline = AthleteBaseline {
            max_hr: 190.0,
            min_hr: 50.0,
        };
        let dropouts: Vec<Sample> = (0..60).map(|i| Sample::new(i, Some(10.0), None)).collect();
        assert!(matches!(
            activity_trimp(&dropouts, &baseline, Gender::Male, &config),
            Err(ComputeError::MissingData(_))
        ));

        let flat = AthleteBaseline {
            max_hr: 120.0,
            min_hr: 120.0,
        };
        assert!(matches!(
            activity_trimp(&dropouts, &flat, Gender::Male, &config),
            Err(ComputeError::InvalidParameter(_))
        ));
    }
}
