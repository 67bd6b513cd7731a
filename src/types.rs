//! Core types for the ride-signals pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw samples and activities, contiguous segments, candidate windows,
//! and the feature rows handed to external reporting.

use crate::error::ComputeError;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Activity date format as recorded by the ride logger
pub const ACTIVITY_DATE_FORMAT: &str = "%Y/%m/%d %H:%M:%S UTC";

/// One per-second reading of an activity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since the activity started
    pub secs: i64,
    /// Heart rate (bpm)
    #[serde(default)]
    pub hr: Option<f64>,
    /// Power output (watts)
    #[serde(default)]
    pub power: Option<f64>,
}

impl Sample {
    pub fn new(secs: i64, hr: Option<f64>, power: Option<f64>) -> Self {
        Self { secs, hr, power }
    }
}

/// Athlete gender, used for plausibility bounds and TRIMP weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "M" => Ok(Gender::Male),
            "F" => Ok(Gender::Female),
            other => Err(ComputeError::MalformedMetadata(format!(
                "unsupported gender '{other}', expected \"M\" or \"F\""
            ))),
        }
    }
}

/// Activity metadata as delivered by the data provider.
///
/// Every field is optional on the wire; consumers validate what they need.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityMetadata {
    #[serde(default)]
    pub activity_id: Option<String>,
    /// Start date, `YYYY/MM/DD HH:MM:SS UTC`
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub sport: Option<String>,
}

/// A recorded exercise session: ordered samples plus metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(default)]
    pub metadata: ActivityMetadata,
    #[serde(default)]
    pub samples: Vec<Sample>,
}

impl Activity {
    pub fn new(metadata: ActivityMetadata, samples: Vec<Sample>) -> Self {
        Self { metadata, samples }
    }

    /// Activity identifier, required for every feature row
    pub fn id(&self) -> Result<&str, ComputeError> {
        self.metadata
            .activity_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ComputeError::MalformedMetadata("missing activity_id".to_string()))
    }

    /// Parsed activity start date
    pub fn date(&self) -> Result<DateTime<Utc>, ComputeError> {
        let raw = self
            .metadata
            .date
            .as_deref()
            .ok_or_else(|| ComputeError::MalformedMetadata("missing date".to_string()))?;
        parse_activity_date(raw)
    }

    pub fn is_sport(&self, sport: &str) -> bool {
        self.metadata.sport.as_deref() == Some(sport)
    }
}

/// Parse an activity date in the ride logger format
pub fn parse_activity_date(raw: &str) -> Result<DateTime<Utc>, ComputeError> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), ACTIVITY_DATE_FORMAT).map_err(|e| {
        ComputeError::MalformedMetadata(format!("unparseable date '{raw}': {e}"))
    })?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// An athlete and all of their recorded activities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Athlete {
    #[serde(rename = "athlete_id")]
    pub id: String,
    pub gender: Gender,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

/// Maximal run of samples with strictly consecutive timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Encounter-order id within one activity
    pub id: usize,
    pub samples: Vec<Sample>,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn start_secs(&self) -> Option<i64> {
        self.samples.first().map(|s| s.secs)
    }

    pub fn end_secs(&self) -> Option<i64> {
        self.samples.last().map(|s| s.secs)
    }

    pub fn hr(&self) -> Vec<Option<f64>> {
        self.samples.iter().map(|s| s.hr).collect()
    }

    pub fn power(&self) -> Vec<Option<f64>> {
        self.samples.iter().map(|s| s.power).collect()
    }
}

/// A fixed-length contiguous sub-run of a segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub segment_id: usize,
    pub start_secs: i64,
    pub end_secs: i64,
    /// HR drop for HRR, mean power for MMP
    pub metric_value: f64,
    /// Heart rate checked by the admission predicate: HR at window start for
    /// HRR, mean HR over the window for MMP
    pub gate_hr: Option<f64>,
}

/// Windowed metric requested from the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Metric {
    /// Heart-rate recovery over `window_len` samples
    Hrr { window_len: usize },
    /// Maximal mean power over `window_minutes` minutes while mean HR stays at
    /// or above `hr_threshold * max_hr`
    MaxMeanPower {
        window_minutes: usize,
        hr_threshold: f64,
    },
}

impl Metric {
    /// HRR(30)
    pub fn hrr30() -> Self {
        Metric::Hrr { window_len: 30 }
    }

    /// Window width in samples, `None` when it does not fit in `usize`
    pub fn window_samples(&self) -> Option<usize> {
        match self {
            Metric::Hrr { window_len } => Some(*window_len),
            Metric::MaxMeanPower { window_minutes, .. } => window_minutes.checked_mul(60),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Hrr { .. } => "hrr",
            Metric::MaxMeanPower { .. } => "mmp",
        }
    }

    /// Column names of a feature table for this metric
    pub fn columns(&self) -> Vec<String> {
        let (prefix, value) = match self {
            Metric::Hrr { window_len } => ("hrr", format!("HRR({window_len})")),
            Metric::MaxMeanPower { .. } => ("mmp", "maximal_mean_power".to_string()),
        };
        vec![
            "athlete_id".to_string(),
            "gender".to_string(),
            "week_no".to_string(),
            "activity_id".to_string(),
            "date".to_string(),
            format!("{prefix}_window_start_secs"),
            format!("{prefix}_window_end_secs"),
            value,
        ]
    }
}

/// One output record per selected window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub athlete_id: String,
    pub gender: Gender,
    pub week_no: i64,
    pub activity_id: String,
    pub date: DateTime<Utc>,
    pub window_start_secs: i64,
    pub window_end_secs: i64,
    pub metric_value: f64,
}

/// Feature rows of one metric, typed even when empty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    pub metric: Metric,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> Vec<String> {
        self.metric.columns()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Athlete-level heart rate baseline used by the admission predicates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AthleteBaseline {
    pub max_hr: f64,
    pub min_hr: f64,
}

/// Training impulse of one activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimpRow {
    pub athlete_id: String,
    pub gender: Gender,
    pub week_no: i64,
    pub activity_id: String,
    pub date: DateTime<Utc>,
    pub duration_minutes: f64,
    pub mean_hr: f64,
    pub trimp: f64,
}

/// Sum of per-activity TRIMP for one training week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyTrimp {
    pub athlete_id: String,
    pub gender: Gender,
    pub week_no: i64,
    pub activities: usize,
    pub trimp: f64,
}
