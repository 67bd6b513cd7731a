//! Pipeline orchestration
//!
//! This module provides the public API for ride-signals. For every ride of an
//! athlete it runs the per-activity extractors, stamps the selected windows
//! with activity and athlete metadata, and concatenates the results.
//!
//! Pipeline stages per athlete:
//! 1. AthleteCalibrator - max/min HR baseline, computed once and cached
//! 2. SegmentBuilder - contiguous runs of samples
//! 3. HampelFilter - outlier-corrected heart rate per segment
//! 4. RollingAggregator - fixed-width sums/means per segment
//! 5. WindowSelector - best admitted window per segment

use crate::adapters::DataProvider;
use crate::baseline::{AthleteCalibrator, CalibrationState};
use crate::config::{validate_mmp_request, PipelineConfig};
use crate::error::ComputeError;
use crate::features::{activity_trimp, metric_windows};
use crate::types::{
    Activity, Athlete, AthleteBaseline, FeatureRow, FeatureTable, Gender, Metric, TrimpRow,
    WeeklyTrimp,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Stateful per-athlete processor.
///
/// The baseline is computed lazily on the first feature request and reused for
/// every later request on the same processor.
pub struct AthleteProcessor {
    athlete: Athlete,
    config: PipelineConfig,
    state: CalibrationState,
    data_start_date: Option<DateTime<Utc>>,
}

impl AthleteProcessor {
    /// Create a processor for an athlete
    pub fn new(athlete: Athlete, config: PipelineConfig) -> Self {
        let data_start_date = first_ride_date(&athlete, &config.sport);
        if data_start_date.is_none() {
            info!(athlete_id = %athlete.id, sport = %config.sport, "no dated rides found");
        }

        Self {
            athlete,
            config,
            state: CalibrationState::Uncalibrated,
            data_start_date,
        }
    }

    /// Create a processor seeded with a previously computed baseline
    pub fn with_baseline(athlete: Athlete, config: PipelineConfig, baseline: AthleteBaseline) -> Self {
        let mut processor = Self::new(athlete, config);
        processor.state = CalibrationState::Calibrated(baseline);
        processor
    }

    pub fn athlete(&self) -> &Athlete {
        &self.athlete
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    /// Date of the athlete's first ride; week numbers count from here
    pub fn data_start_date(&self) -> Option<DateTime<Utc>> {
        self.data_start_date
    }

    /// Baseline of the athlete, calibrating on first use.
    ///
    /// A failed calibration is final for this processor and is reported again
    /// on every call.
    pub fn calibrate(&mut self) -> Result<AthleteBaseline, ComputeError> {
        match self.state {
            CalibrationState::Calibrated(baseline) => return Ok(baseline),
            CalibrationState::Failed { found, required } => {
                return Err(ComputeError::InsufficientCalibrationData { found, required })
            }
            CalibrationState::Degenerate { max_hr, min_hr } => {
                return Err(ComputeError::DegenerateBaseline { max_hr, min_hr })
            }
            CalibrationState::Uncalibrated | CalibrationState::Calibrating => {}
        }

        self.state = CalibrationState::Calibrating;
        match AthleteCalibrator::from_config(&self.config).calibrate(&self.athlete) {
            Ok(baseline) => {
                info!(
                    athlete_id = %self.athlete.id,
                    max_hr = baseline.max_hr,
                    min_hr = baseline.min_hr,
                    "athlete calibrated"
                );
                self.state = CalibrationState::Calibrated(baseline);
                Ok(baseline)
            }
            Err(ComputeError::InsufficientCalibrationData { found, required }) => {
                self.state = CalibrationState::Failed { found, required };
                Err(ComputeError::InsufficientCalibrationData { found, required })
            }
            Err(ComputeError::DegenerateBaseline { max_hr, min_hr }) => {
                self.state = CalibrationState::Degenerate { max_hr, min_hr };
                Err(ComputeError::DegenerateBaseline { max_hr, min_hr })
            }
            Err(e) => {
                self.state = CalibrationState::Uncalibrated;
                Err(e)
            }
        }
    }

    /// HRR feature table using the configured window
    pub fn process_hrr(&mut self) -> Result<FeatureTable, ComputeError> {
        let metric = Metric::Hrr {
            window_len: self.config.hrr.window_len,
        };
        self.process(metric)
    }

    /// Maximal mean power feature table
    pub fn process_mmp(
        &mut self,
        hr_threshold: f64,
        window_minutes: usize,
    ) -> Result<FeatureTable, ComputeError> {
        self.process(Metric::MaxMeanPower {
            window_minutes,
            hr_threshold,
        })
    }

    /// Feature table of a windowed metric across all of the athlete's rides.
    ///
    /// Rides without usable data or with malformed metadata contribute no rows.
    /// An athlete without rides yields an empty table; only calibration failure
    /// is returned as an error.
    pub fn process(&mut self, metric: Metric) -> Result<FeatureTable, ComputeError> {
        match metric {
            Metric::Hrr { window_len } if window_len < 2 => {
                return Err(ComputeError::InvalidParameter(
                    "hrr window must be at least 2 samples".to_string(),
                ));
            }
            Metric::MaxMeanPower {
                window_minutes,
                hr_threshold,
            } => validate_mmp_request(window_minutes, hr_threshold)?,
            Metric::Hrr { .. } => {}
        }

        let mut table = FeatureTable::new(metric);
        let Some(start_date) = self.data_start_date else {
            return Ok(table);
        };
        let baseline = self.calibrate()?;

        for activity in self.rides() {
            let Some((activity_id, date)) = stamp(activity, &self.athlete.id) else {
                continue;
            };

            let windows = match metric_windows(&metric, &activity.samples, baseline.max_hr, &self.config) {
                Ok(windows) => windows,
                Err(e) if e.is_local() => {
                    debug!(athlete_id = %self.athlete.id, %activity_id, error = %e, "ride skipped");
                    continue;
                }
                Err(e) => return Err(e),
            };

            table.rows.extend(windows.into_iter().map(|window| FeatureRow {
                athlete_id: self.athlete.id.clone(),
                gender: self.athlete.gender,
                week_no: week_no(date, start_date),
                activity_id: activity_id.clone(),
                date,
                window_start_secs: window.start_secs,
                window_end_secs: window.end_secs,
                metric_value: window.metric_value,
            }));
        }

        info!(
            athlete_id = %self.athlete.id,
            metric = metric.name(),
            rows = table.len(),
            "features extracted"
        );
        Ok(table)
    }

    /// Per-ride training impulse
    pub fn process_trimp(&mut self) -> Result<Vec<TrimpRow>, ComputeError> {
        let Some(start_date) = self.data_start_date else {
            return Ok(Vec::new());
        };
        let baseline = self.calibrate()?;
        let mut rows = Vec::new();

        for activity in self.rides() {
            let Some((activity_id, date)) = stamp(activity, &self.athlete.id) else {
                continue;
            };

            let score = match activity_trimp(&activity.samples, &baseline, self.athlete.gender, &self.config) {
                Ok(score) => score,
                Err(e) if e.is_local() => {
                    debug!(athlete_id = %self.athlete.id, %activity_id, error = %e, "ride skipped");
                    continue;
                }
                Err(e) => return Err(e),
            };

            rows.push(TrimpRow {
                athlete_id: self.athlete.id.clone(),
                gender: self.athlete.gender,
                week_no: week_no(date, start_date),
                activity_id,
                date,
                duration_minutes: score.duration_minutes,
                mean_hr: score.mean_hr,
                trimp: score.trimp,
            });
        }

        Ok(rows)
    }

    /// Training impulse summed per training week
    pub fn weekly_trimp(&mut self) -> Result<Vec<WeeklyTrimp>, ComputeError> {
        Ok(aggregate_weekly(&self.process_trimp()?))
    }

    fn rides(&self) -> impl Iterator<Item = &Activity> {
        let sport = self.config.sport.as_str();
        self.athlete.activities.iter().filter(move |a| a.is_sport(sport))
    }
}

/// Sum TRIMP rows per `(athlete_id, gender, week_no)`, ordered by key
pub fn aggregate_weekly(rows: &[TrimpRow]) -> Vec<WeeklyTrimp> {
    let mut weeks: BTreeMap<(String, Gender, i64), (usize, f64)> = BTreeMap::new();
    for row in rows {
        let entry = weeks
            .entry((row.athlete_id.clone(), row.gender, row.week_no))
            .or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += row.trimp;
    }

    weeks
        .into_iter()
        .map(|((athlete_id, gender, week_no), (activities, trimp))| WeeklyTrimp {
            athlete_id,
            gender,
            week_no,
            activities,
            trimp,
        })
        .collect()
}

/// Whole weeks elapsed since the athlete's first ride
pub fn week_no(date: DateTime<Utc>, start_date: DateTime<Utc>) -> i64 {
    (date - start_date).num_days().div_euclid(7)
}

/// Earliest parseable date among the athlete's rides
fn first_ride_date(athlete: &Athlete, sport: &str) -> Option<DateTime<Utc>> {
    athlete
        .activities
        .iter()
        .filter(|a| a.is_sport(sport))
        .filter_map(|a| a.date().ok())
        .min()
}

/// Activity id and date, or `None` (logged) when the metadata is unusable
fn stamp(activity: &Activity, athlete_id: &str) -> Option<(String, DateTime<Utc>)> {
    match (activity.id(), activity.date()) {
        (Ok(id), Ok(date)) => Some((id.to_string(), date)),
        (Err(e), _) | (_, Err(e)) => {
            warn!(
                %athlete_id,
                activity_id = activity.metadata.activity_id.as_deref().unwrap_or("?"),
                error = %e,
                "skipping ride with malformed metadata"
            );
            None
        }
    }
}

/// Feature extraction outcome of one athlete in a batch
#[derive(Debug)]
pub struct AthleteFeatures {
    pub athlete_id: String,
    /// Calibration state after extraction; `Uncalibrated` if the athlete
    /// could not be loaded
    pub calibration: CalibrationState,
    pub outcome: Result<FeatureTable, ComputeError>,
}

/// Extract a windowed metric for every athlete a provider knows about.
///
/// Athletes are processed in provider order; a failure for one athlete is
/// recorded in its outcome and does not stop the batch.
pub fn extract_features(
    provider: &dyn DataProvider,
    config: &PipelineConfig,
    metric: Metric,
) -> Result<Vec<AthleteFeatures>, ComputeError> {
    config.validate()?;

    let results = provider
        .list_athletes()
        .into_iter()
        .map(|athlete_id| {
            let (calibration, outcome) = match provider.get_athlete(&athlete_id) {
                Ok(athlete) => {
                    let mut processor = AthleteProcessor::new(athlete, config.clone());
                    let outcome = processor.process(metric);
                    (processor.state(), outcome)
                }
                Err(e) => (CalibrationState::Uncalibrated, Err(e)),
            };
            if let Err(e) = &outcome {
                warn!(%athlete_id, error = %e, "athlete produced no features");
            }
            AthleteFeatures {
                athlete_id,
                calibration,
                outcome,
            }
        })
        .collect();

    Ok(results)
}
