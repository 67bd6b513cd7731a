//! In-memory athlete provider
//!
//! Holds fully parsed athletes keyed by id. Athletes are loaded from a JSON
//! array, a single JSON object, or NDJSON (one athlete per line).

use crate::error::ComputeError;
use crate::types::Athlete;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::warn;

use super::DataProvider;

/// Athletes held in memory, listed in ascending id order
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    athletes: BTreeMap<String, Athlete>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AthletesDocument {
    Many(Vec<Athlete>),
    One(Athlete),
}

impl InMemoryProvider {
    /// Build a provider from parsed athletes; a repeated id replaces the
    /// earlier athlete.
    pub fn new(athletes: Vec<Athlete>) -> Self {
        let mut provider = Self::default();
        for athlete in athletes {
            provider.insert(athlete);
        }
        provider
    }

    /// Parse a JSON array of athletes or a single athlete object
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let document: AthletesDocument = serde_json::from_str(json)?;
        let athletes = match document {
            AthletesDocument::Many(athletes) => athletes,
            AthletesDocument::One(athlete) => vec![athlete],
        };
        Ok(Self::new(athletes))
    }

    /// Parse newline-delimited JSON, one athlete per line
    pub fn from_ndjson(ndjson: &str) -> Result<Self, ComputeError> {
        let mut athletes = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let athlete = serde_json::from_str::<Athlete>(trimmed).map_err(|e| {
                ComputeError::ParseError(format!("Failed to parse line {}: {}", line_num + 1, e))
            })?;
            athletes.push(athlete);
        }
        Ok(Self::new(athletes))
    }

    pub fn insert(&mut self, athlete: Athlete) {
        if let Some(previous) = self.athletes.insert(athlete.id.clone(), athlete) {
            warn!(athlete_id = %previous.id, "duplicate athlete replaced");
        }
    }

    /// Keep only the given athlete, failing if it is unknown
    pub fn retain_only(&mut self, athlete_id: &str) -> Result<(), ComputeError> {
        let athlete = self
            .athletes
            .remove(athlete_id)
            .ok_or_else(|| ComputeError::AthleteNotFound(athlete_id.to_string()))?;
        self.athletes.clear();
        self.athletes.insert(athlete.id.clone(), athlete);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.athletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.athletes.is_empty()
    }
}

impl DataProvider for InMemoryProvider {
    fn get_athlete(&self, athlete_id: &str) -> Result<Athlete, ComputeError> {
        self.athletes
            .get(athlete_id)
            .cloned()
            .ok_or_else(|| ComputeError::AthleteNotFound(athlete_id.to_string()))
    }

    fn list_athletes(&self) -> Vec<String> {
        self.athletes.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Gender;
    use pretty_assertions::assert_eq;

    const ATHLETES: &str = r#"[
        {"athlete_id": "b2", "gender": "F", "activities": []},
        {"athlete_id": "a1", "gender": "M", "activities": [
            {"metadata": {"activity_id": "r1", "date": "2020/01/01 09:00:00 UTC", "sport": "Bike"},
             "samples": [{"secs": 0, "hr": 120.0, "power": 180.0}, {"secs": 1, "hr": null}]}
        ]}
    ]"#;

    #[test]
    fn test_parse_json_array() {
        let provider = InMemoryProvider::from_json(ATHLETES).unwrap();
        assert_eq!(provider.list_athletes(), vec!["a1", "b2"]);

        let athlete = provider.get_athlete("a1").unwrap();
        assert_eq!(athlete.gender, Gender::Male);
        assert_eq!(athlete.activities[0].samples.len(), 2);
        assert_eq!(athlete.activities[0].samples[1].hr, None);
        assert_eq!(athlete.activities[0].samples[1].power, None);
    }

    #[test]
    fn test_parse_single_object() {
        let provider =
            InMemoryProvider::from_json(r#"{"athlete_id": "solo", "gender": "F"}"#).unwrap();
        assert_eq!(provider.list_athletes(), vec!["solo"]);
        assert!(provider.get_athlete("solo").unwrap().activities.is_empty());
    }

    #[test]
    fn test_parse_ndjson() {
        let ndjson = r#"{"athlete_id": "a1", "gender": "M"}

{"athlete_id": "a2", "gender": "F"}"#;
        let provider = InMemoryProvider::from_ndjson(ndjson).unwrap();
        assert_eq!(provider.len(), 2);
    }

    #[test]
    fn test_ndjson_error_reports_line() {
        let ndjson = "{\"athlete_id\": \"a1\", \"gender\": \"M\"}\n{\"athlete_id\": \"a2\", \"gender\": \"X\"}";
        match InMemoryProvider::from_ndjson(ndjson) {
            Err(ComputeError::ParseError(msg)) => assert!(msg.contains("line 2")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_athlete() {
        let mut provider = InMemoryProvider::from_json(ATHLETES).unwrap();
        assert!(matches!(
            provider.get_athlete("zz"),
            Err(ComputeError::AthleteNotFound(_))
        ));
        assert!(matches!(
            provider.retain_only("zz"),
            Err(ComputeError::AthleteNotFound(_))
        ));

        provider.retain_only("b2").unwrap();
        assert_eq!(provider.list_athletes(), vec!["b2"]);
    }
}
