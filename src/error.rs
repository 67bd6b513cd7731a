//! Error types for ride-signals

use thiserror::Error;

/// Errors that can occur during feature extraction
///
/// Per-activity and per-segment variants are absorbed by the pipeline
/// (skip-and-continue). Only calibration failure reaches the caller.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Insufficient length: {0}")]
    InsufficientLength(String),

    #[error("Insufficient calibration data: {found} valid extremes, need {required}")]
    InsufficientCalibrationData { found: usize, required: usize },

    #[error("Degenerate baseline: max HR {max_hr} does not exceed min HR {min_hr}")]
    DegenerateBaseline { max_hr: f64, min_hr: f64 },

    #[error("Malformed metadata: {0}")]
    MalformedMetadata(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Athlete not found: {0}")]
    AthleteNotFound(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ComputeError {
    /// Whether this error only concerns a single activity or segment and
    /// should be skipped rather than surfaced.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ComputeError::MissingData(_)
                | ComputeError::InsufficientLength(_)
                | ComputeError::MalformedMetadata(_)
        )
    }

    /// Whether this error means no usable baseline could be estimated
    pub fn is_calibration_failure(&self) -> bool {
        matches!(
            self,
            ComputeError::InsufficientCalibrationData { .. } | ComputeError::DegenerateBaseline { .. }
        )
    }
}
