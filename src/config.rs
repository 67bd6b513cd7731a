//! Pipeline configuration
//!
//! Every parameter has a default matching the reference HRR(30) / MMP / TRIMP
//! definitions. A partial JSON document overrides only the fields it names.

use crate::error::ComputeError;
use crate::types::Gender;
use serde::{Deserialize, Serialize};

/// Outlier filter parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Samples on each side of the centre point
    pub half_window: usize,
    /// Deviation threshold in scaled-MAD units
    pub n_sigma: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            half_window: 10,
            n_sigma: 3.0,
        }
    }
}

/// Heart-rate recovery parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HrrConfig {
    /// Window width in samples
    pub window_len: usize,
    /// Rows above this power are not recovery; `None` disables the gate
    pub max_power_watts: Option<f64>,
    /// HR at window start must reach this fraction of max HR
    pub start_hr_fraction: f64,
}

impl Default for HrrConfig {
    fn default() -> Self {
        Self {
            window_len: 30,
            max_power_watts: Some(20.0),
            start_hr_fraction: 0.8,
        }
    }
}

/// Athlete baseline calibration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Minimum number of plausible per-activity extremes
    pub min_readings: usize,
    /// Percentile of collected minima used as min HR
    pub lower_percentile: f64,
    /// Percentile of collected maxima used as max HR
    pub upper_percentile: f64,
    pub hr_floor: f64,
    pub male_hr_ceiling: f64,
    pub female_hr_ceiling: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_readings: 20,
            lower_percentile: 5.0,
            upper_percentile: 95.0,
            hr_floor: 40.0,
            male_hr_ceiling: 215.0,
            female_hr_ceiling: 210.0,
        }
    }
}

impl CalibrationConfig {
    /// Physiologically plausible HR range for a gender
    pub fn plausible_range(&self, gender: Gender) -> (f64, f64) {
        match gender {
            Gender::Male => (self.hr_floor, self.male_hr_ceiling),
            Gender::Female => (self.hr_floor, self.female_hr_ceiling),
        }
    }
}

/// TRIMP weighting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimpConfig {
    pub male_weight: f64,
    pub female_weight: f64,
}

impl Default for TrimpConfig {
    fn default() -> Self {
        Self {
            male_weight: 1.92,
            female_weight: 1.67,
        }
    }
}

impl TrimpConfig {
    pub fn weight(&self, gender: Gender) -> f64 {
        match gender {
            Gender::Male => self.male_weight,
            Gender::Female => self.female_weight,
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub filter: FilterConfig,
    pub hrr: HrrConfig,
    pub calibration: CalibrationConfig,
    pub trimp: TrimpConfig,
    /// Readings below this HR are sensor dropouts
    pub min_valid_hr: f64,
    /// Only activities of this sport are processed
    pub sport: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            hrr: HrrConfig::default(),
            calibration: CalibrationConfig::default(),
            trimp: TrimpConfig::default(),
            min_valid_hr: 25.0,
            sport: "Bike".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Reject parameter combinations the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.filter.half_window == 0 {
            return Err(invalid("filter.half_window must be at least 1"));
        }
        if !(self.filter.n_sigma.is_finite() && self.filter.n_sigma >= 0.0) {
            return Err(invalid("filter.n_sigma must be a non-negative number"));
        }
        if self.hrr.window_len < 2 {
            return Err(invalid("hrr.window_len must be at least 2"));
        }
        if !is_fraction(self.hrr.start_hr_fraction) {
            return Err(invalid("hrr.start_hr_fraction must lie in [0, 1]"));
        }
        if let Some(cap) = self.hrr.max_power_watts {
            if !cap.is_finite() {
                return Err(invalid("hrr.max_power_watts must be finite"));
            }
        }
        let cal = &self.calibration;
        if cal.min_readings == 0 {
            return Err(invalid("calibration.min_readings must be at least 1"));
        }
        for p in [cal.lower_percentile, cal.upper_percentile] {
            if !(p.is_finite() && (0.0..=100.0).contains(&p)) {
                return Err(invalid("calibration percentiles must lie in [0, 100]"));
            }
        }
        if !(cal.hr_floor < cal.male_hr_ceiling && cal.hr_floor < cal.female_hr_ceiling) {
            return Err(invalid("calibration.hr_floor must be below both ceilings"));
        }
        if !(self.trimp.male_weight.is_finite() && self.trimp.female_weight.is_finite()) {
            return Err(invalid("trimp weights must be finite"));
        }
        if !self.min_valid_hr.is_finite() {
            return Err(invalid("min_valid_hr must be finite"));
        }
        Ok(())
    }
}

/// Validate an MMP request against the configuration
pub fn validate_mmp_request(window_minutes: usize, hr_threshold: f64) -> Result<(), ComputeError> {
    if window_minutes == 0 {
        return Err(invalid("mmp window must be at least one minute"));
    }
    mmp_window_samples(window_minutes)?;
    if !is_fraction(hr_threshold) {
        return Err(invalid("mmp hr_threshold must lie in [0, 1]"));
    }
    Ok(())
}

/// MMP window width in samples, rejecting widths that overflow
pub fn mmp_window_samples(window_minutes: usize) -> Result<usize, ComputeError> {
    window_minutes
        .checked_mul(60)
        .ok_or_else(|| invalid("mmp window is too long"))
}

fn is_fraction(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

fn invalid(msg: &str) -> ComputeError {
    ComputeError::InvalidParameter(msg.to_string())
}
