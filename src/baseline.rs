//! Athlete baseline calibration
//!
//! Estimates an athlete's max and min heart rate from outlier-filtered
//! extremes across their rides. Percentiles of the per-ride extremes are used
//! instead of the absolute max/min so that residual sensor error in a handful
//! of rides does not move the baseline.

use crate::config::{CalibrationConfig, PipelineConfig};
use crate::error::ComputeError;
use crate::filter::HampelFilter;
use crate::segment::SegmentBuilder;
use crate::types::{Activity, Athlete, AthleteBaseline, Gender};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, warn};

/// Calibration lifecycle of one athlete
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CalibrationState {
    #[default]
    Uncalibrated,
    /// Baseline computation in progress
    Calibrating,
    Calibrated(AthleteBaseline),
    /// Not enough plausible extremes to estimate a baseline
    Failed { found: usize, required: usize },
    /// Extremes collapsed to a baseline without any HR reserve
    Degenerate { max_hr: f64, min_hr: f64 },
}

impl CalibrationState {
    pub fn baseline(&self) -> Option<AthleteBaseline> {
        match self {
            CalibrationState::Calibrated(baseline) => Some(*baseline),
            _ => None,
        }
    }
}

/// Per-ride heart rate extremes collected for calibration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HrExtremes {
    pub maxima: Vec<f64>,
    pub minima: Vec<f64>,
}

impl HrExtremes {
    /// Number of usable readings: the smaller of both collections
    pub fn readings(&self) -> usize {
        self.maxima.len().min(self.minima.len())
    }
}

/// Computes athlete baselines from filtered HR extremes
#[derive(Debug, Clone)]
pub struct AthleteCalibrator {
    filter: HampelFilter,
    config: CalibrationConfig,
    sport: String,
}

impl AthleteCalibrator {
    pub fn new(filter: HampelFilter, config: CalibrationConfig, sport: impl Into<String>) -> Self {
        Self {
            filter,
            config,
            sport: sport.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            HampelFilter::from_config(&config.filter),
            config.calibration.clone(),
            config.sport.clone(),
        )
    }

    /// Collect plausible per-ride extremes across the athlete's rides
    pub fn collect_extremes(&self, athlete: &Athlete) -> HrExtremes {
        let mut extremes = HrExtremes::default();

        for activity in athlete.activities.iter().filter(|a| a.is_sport(&self.sport)) {
            match self.activity_extremes(activity, athlete.gender) {
                Some((min, max)) => {
                    extremes.minima.push(min);
                    extremes.maxima.push(max);
                }
                None => debug!(
                    athlete_id = %athlete.id,
                    activity_id = activity.metadata.activity_id.as_deref().unwrap_or("?"),
                    "no plausible filtered heart rate"
                ),
            }
        }

        extremes
    }

    /// Estimate the athlete's baseline.
    ///
    /// Fails with `InsufficientCalibrationData` rather than guessing when
    /// fewer than `min_readings` rides contribute extremes, and with
    /// `DegenerateBaseline` when the max HR does not exceed the min HR.
    pub fn calibrate(&self, athlete: &Athlete) -> Result<AthleteBaseline, ComputeError> {
        let extremes = self.collect_extremes(athlete);
        let found = extremes.readings();
        let required = self.config.min_readings;

        if found < required {
            warn!(athlete_id = %athlete.id, found, required, "calibration failed");
            return Err(ComputeError::InsufficientCalibrationData { found, required });
        }

        let max_hr = percentile(&extremes.maxima, self.config.upper_percentile);
        let min_hr = percentile(&extremes.minima, self.config.lower_percentile);

        match (max_hr, min_hr) {
            (Some(max_hr), Some(min_hr)) if max_hr > min_hr => Ok(AthleteBaseline { max_hr, min_hr }),
            (Some(max_hr), Some(min_hr)) => {
                warn!(athlete_id = %athlete.id, max_hr, min_hr, "calibration produced no HR reserve");
                Err(ComputeError::DegenerateBaseline { max_hr, min_hr })
            }
            _ => Err(ComputeError::InsufficientCalibrationData { found, required }),
        }
    }

    /// Min and max of the filtered, plausible HR of one ride
    fn activity_extremes(&self, activity: &Activity, gender: Gender) -> Option<(f64, f64)> {
        let (floor, ceiling) = self.config.plausible_range(gender);
        let segments = match SegmentBuilder::new(self.filter.window_size())
            .build(&activity.samples)
            .into_segments()
        {
            Ok(segments) => segments,
            Err(e) => {
                debug!(error = %e, "ride skipped for calibration");
                return None;
            }
        };

        segments
            .iter()
            .filter_map(|segment| self.filter.filter_segment(segment).ok())
            .flat_map(|segment| segment.samples.into_iter().filter_map(|s| s.hr))
            .filter(|hr| hr.is_finite() && (floor..=ceiling).contains(hr))
            .fold(None, |acc, hr| match acc {
                None => Some((hr, hr)),
                Some((min, max)) => Some((f64::min(min, hr), f64::max(max, hr))),
            })
    }
}

/// Percentile with linear interpolation between closest ranks
pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=100.0).contains(&pct) {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActivityMetadata, Sample};

    fn ride(id: usize, low: f64, high: f64) -> Activity {
        // 60 s at `low`, then 60 s at `high`
        let samples = (0..120)
            .map(|i| Sample::new(i, Some(if i < 60 { low } else { high }), Some(150.0)))
            .collect();
        Activity::new(
            ActivityMetadata {
                activity_id: Some(format!("ride-{id}")),
                date: Some("2021/05/01 08:00:00 UTC".to_string()),
                sport: Some("Bike".to_string()),
            },
            samples,
        )
    }

    fn athlete(gender: Gender, activities: Vec<Activity>) -> Athlete {
        Athlete {
            id: "athlete-1".to_string(),
            gender,
            activities,
        }
    }

    #[test]
    fn test_percentile_interpolation() {
        let values: Vec<f64> = (1..=5).map(f64::from).collect();
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 50.0), Some(3.0));
        assert_eq!(percentile(&values, 100.0), Some(5.0));
        assert!((percentile(&values, 95.0).unwrap() - 4.8).abs() < 1e-12);
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn test_calibration_from_twenty_rides() {
        let rides = (0..20)
            .map(|i| ride(i, 60.0 + i as f64, 170.0 + i as f64))
            .collect();
        let calibrator = AthleteCalibrator::from_config(&PipelineConfig::default());
        let baseline = calibrator.calibrate(&athlete(Gender::Male, rides)).unwrap();

        assert!((baseline.max_hr - 188.05).abs() < 1e-9);
        assert!((baseline.min_hr - 60.95).abs() < 1e-9);
    }

    #[test]
    fn test_insufficient_rides_fail() {
        let rides = (0..19).map(|i| ride(i, 60.0, 180.0)).collect();
        let calibrator = AthleteCalibrator::from_config(&PipelineConfig::default());
        let result = calibrator.calibrate(&athlete(Gender::Male, rides));

        assert!(matches!(
            result,
            Err(ComputeError::InsufficientCalibrationData {
                found: 19,
                required: 20
            })
        ));
    }

    #[test]
    fn test_flat_heart_rate_is_degenerate() {
        let rides = (0..20).map(|i| ride(i, 140.0, 140.0)).collect();
        let calibrator = AthleteCalibrator::from_config(&PipelineConfig::default());
        let result = calibrator.calibrate(&athlete(Gender::Male, rides));

        assert!(matches!(
            result,
            Err(ComputeError::DegenerateBaseline { max_hr, min_hr }) if max_hr == 140.0 && min_hr == 140.0
        ));
    }

    #[test]
    fn test_implausible_values_discarded() {
        let calibrator = AthleteCalibrator::from_config(&PipelineConfig::default());
        // 212 is plausible for men but not for women; 30 is never plausible
        let extremes = calibrator.collect_extremes(&athlete(Gender::Female, vec![ride(0, 30.0, 212.0)]));
        assert!(extremes.maxima.is_empty());

        let extremes = calibrator.collect_extremes(&athlete(Gender::Male, vec![ride(0, 30.0, 212.0)]));
        assert_eq!(extremes.maxima, vec![212.0]);
        assert_eq!(extremes.minima, vec![212.0]);
    }

    #[test]
    fn test_other_sports_and_short_rides_ignored() {
        let mut run = ride(1, 60.0, 180.0);
        run.metadata.sport = Some("Run".to_string());
        let mut short = ride(2, 60.0, 180.0);
        short.samples.truncate(15);

        let calibrator = AthleteCalibrator::from_config(&PipelineConfig::default());
        let extremes = calibrator.collect_extremes(&athlete(Gender::Male, vec![run, short]));
        assert_eq!(extremes.readings(), 0);
    }

    #[test]
    fn test_spikes_filtered_before_extremes() {
        let mut spiky = ride(0, 60.0, 170.0);
        spiky.samples[90].hr = Some(205.0);
        let calibrator = AthleteCalibrator::from_config(&PipelineConfig::default());
        let extremes = calibrator.collect_extremes(&athlete(Gender::Male, vec![spiky]));
        assert_eq!(extremes.maxima, vec![170.0]);
        assert_eq!(extremes.minima, vec![60.0]);
    }

    #[test]
    fn test_state_serialization() {
        let state = CalibrationState::Calibrated(AthleteBaseline {
            max_hr: 190.0,
            min_hr: 50.0,
        });
        let json = serde_json::to_string(&state).unwrap();
        let loaded: CalibrationState = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.baseline(), state.baseline());
        assert_eq!(CalibrationState::default().baseline(), None);
    }
}
