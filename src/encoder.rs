//! Report encoding
//!
//! Wraps per-athlete feature rows into a self-describing report: producer
//! provenance, the column schema of the metric, and one JSON object per row
//! keyed by those columns.

use crate::baseline::CalibrationState;
use crate::error::ComputeError;
use crate::types::{FeatureRow, FeatureTable, TrimpRow, WeeklyTrimp};
use crate::{PRODUCER_NAME, VERSION};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Current report schema version
pub const REPORT_VERSION: &str = "1.0.0";

/// Columns of a per-activity TRIMP report
pub const TRIMP_COLUMNS: [&str; 8] = [
    "athlete_id",
    "gender",
    "week_no",
    "activity_id",
    "date",
    "duration_minutes",
    "mean_hr",
    "trimp",
];

/// Columns of a weekly TRIMP report
pub const WEEKLY_TRIMP_COLUMNS: [&str; 5] = ["athlete_id", "gender", "week_no", "activities", "trimp"];

/// Producer metadata stamped on every report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Feature rows of one athlete and one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureReport {
    pub report_version: String,
    pub producer: Producer,
    pub computed_at_utc: String,
    pub athlete_id: String,
    pub metric: String,
    /// Calibration outcome the rows were computed under
    pub calibration: CalibrationState,
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

/// Report encoder with a stable producer instance id
pub struct FeatureEncoder {
    instance_id: String,
}

impl Default for FeatureEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Encode a windowed-metric feature table
    pub fn encode_table(
        &self,
        athlete_id: &str,
        table: &FeatureTable,
        calibration: CalibrationState,
    ) -> FeatureReport {
        let columns = table.columns();
        let rows = table
            .rows
            .iter()
            .map(|row| keyed(&columns, feature_values(row)))
            .collect();
        self.report(athlete_id, table.metric.name(), columns, rows, calibration)
    }

    /// Encode per-activity TRIMP rows
    pub fn encode_trimp(
        &self,
        athlete_id: &str,
        rows: &[TrimpRow],
        calibration: CalibrationState,
    ) -> FeatureReport {
        let columns = owned(&TRIMP_COLUMNS);
        let rows = rows
            .iter()
            .map(|row| {
                keyed(
                    &columns,
                    vec![
                        json!(row.athlete_id),
                        json!(row.gender),
                        json!(row.week_no),
                        json!(row.activity_id),
                        json!(row.date.to_rfc3339()),
                        json!(row.duration_minutes),
                        json!(row.mean_hr),
                        json!(row.trimp),
                    ],
                )
            })
            .collect();
        self.report(athlete_id, "trimp", columns, rows, calibration)
    }

    /// Encode weekly TRIMP sums
    pub fn encode_weekly_trimp(
        &self,
        athlete_id: &str,
        weeks: &[WeeklyTrimp],
        calibration: CalibrationState,
    ) -> FeatureReport {
        let columns = owned(&WEEKLY_TRIMP_COLUMNS);
        let rows = weeks
            .iter()
            .map(|week| {
                keyed(
                    &columns,
                    vec![
                        json!(week.athlete_id),
                        json!(week.gender),
                        json!(week.week_no),
                        json!(week.activities),
                        json!(week.trimp),
                    ],
                )
            })
            .collect();
        self.report(athlete_id, "weekly_trimp", columns, rows, calibration)
    }

    fn report(
        &self,
        athlete_id: &str,
        metric: &str,
        columns: Vec<String>,
        rows: Vec<Map<String, Value>>,
        calibration: CalibrationState,
    ) -> FeatureReport {
        FeatureReport {
            report_version: REPORT_VERSION.to_string(),
            producer: Producer {
                name: PRODUCER_NAME.to_string(),
                version: VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now().to_rfc3339(),
            athlete_id: athlete_id.to_string(),
            metric: metric.to_string(),
            calibration,
            columns,
            rows,
        }
    }
}

/// One report per line
pub fn to_ndjson(reports: &[FeatureReport]) -> Result<String, ComputeError> {
    let mut out = String::new();
    for report in reports {
        out.push_str(&serde_json::to_string(report)?);
        out.push('\n');
    }
    Ok(out)
}

fn feature_values(row: &FeatureRow) -> Vec<Value> {
    vec![
        json!(row.athlete_id),
        json!(row.gender),
        json!(row.week_no),
        json!(row.activity_id),
        json!(row.date.to_rfc3339()),
        json!(row.window_start_secs),
        json!(row.window_end_secs),
        json!(row.metric_value),
    ]
}

fn keyed(columns: &[String], values: Vec<Value>) -> Map<String, Value> {
    columns.iter().cloned().zip(values).collect()
}

fn owned(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AthleteBaseline, Gender, Metric};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    const CALIBRATED: CalibrationState = CalibrationState::Calibrated(AthleteBaseline {
        max_hr: 190.0,
        min_hr: 50.0,
    });

    fn hrr_table() -> FeatureTable {
        let mut table = FeatureTable::new(Metric::hrr30());
        table.rows.push(FeatureRow {
            athlete_id: "a1".to_string(),
            gender: Gender::Female,
            week_no: 3,
            activity_id: "r9".to_string(),
            date: Utc.with_ymd_and_hms(2020, 2, 1, 8, 0, 0).unwrap(),
            window_start_secs: 120,
            window_end_secs: 149,
            metric_value: 42.0,
        });
        table
    }

    #[test]
    fn test_encode_feature_table() {
        let encoder = FeatureEncoder::with_instance_id("test-instance".to_string());
        let report = encoder.encode_table("a1", &hrr_table(), CALIBRATED);

        assert_eq!(report.producer.name, PRODUCER_NAME);
        assert_eq!(report.producer.instance_id, "test-instance");
        assert_eq!(report.metric, "hrr");
        assert_eq!(report.columns, Metric::hrr30().columns());

        let row = &report.rows[0];
        assert_eq!(row["HRR(30)"], json!(42.0));
        assert_eq!(row["hrr_window_start_secs"], json!(120));
        assert_eq!(row["hrr_window_end_secs"], json!(149));
        assert_eq!(row["gender"], json!("F"));
        assert_eq!(row["date"], json!("2020-02-01T08:00:00+00:00"));
        assert_eq!(row.len(), report.columns.len());
    }

    #[test]
    fn test_empty_report_keeps_schema() {
        let encoder = FeatureEncoder::new();
        let failed = CalibrationState::Failed {
            found: 3,
            required: 20,
        };
        let metric = Metric::MaxMeanPower {
            window_minutes: 5,
            hr_threshold: 0.85,
        };
        let report = encoder.encode_table("a1", &FeatureTable::new(metric), failed);

        assert!(report.rows.is_empty());
        assert_eq!(report.columns[7], "maximal_mean_power");
        assert_eq!(report.calibration, failed);
        assert!(Uuid::parse_str(encoder.instance_id()).is_ok());
    }

    #[test]
    fn test_weekly_trimp_report() {
        let encoder = FeatureEncoder::new();
        let weeks = vec![WeeklyTrimp {
            athlete_id: "a1".to_string(),
            gender: Gender::Male,
            week_no: 0,
            activities: 2,
            trimp: 164.5,
        }];
        let report = encoder.encode_weekly_trimp("a1", &weeks, CALIBRATED);
        assert_eq!(report.metric, "weekly_trimp");
        assert_eq!(report.rows[0]["activities"], json!(2));
        assert_eq!(report.rows[0]["trimp"], json!(164.5));
    }

    #[test]
    fn test_ndjson_one_report_per_line() {
        let encoder = FeatureEncoder::new();
        let reports = vec![
            encoder.encode_table("a1", &hrr_table(), CALIBRATED),
            encoder.encode_trimp("a2", &[], CALIBRATED),
        ];
        let out = to_ndjson(&reports).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: FeatureReport = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.metric, "trimp");
        assert_eq!(parsed.columns.len(), TRIMP_COLUMNS.len());
    }
}
