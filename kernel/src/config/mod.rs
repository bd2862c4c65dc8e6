// Tracker Configuration
//
// Names the tracked collections, their scoring weights and the local
// time zone every timestamp is bucketed in. Passed explicitly into the
// reconciler and the stats engine.

use std::collections::HashSet;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// One tracked collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Display name, also embedded in rendered event text.
    pub name: String,

    /// Identifier understood by the membership source.
    pub id: String,

    /// Points awarded per item to its secondary entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<i64>,

    /// Applied once to an entity's score if it appears here at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<i64>,
}

/// Configuration loaded from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "default_time_zone")]
    pub time_zone: Tz,

    /// Ordered. The order is used for presentation and score tie-breaks.
    pub collections: Vec<CollectionConfig>,

    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,

    #[serde(default = "default_snapshot_prefix")]
    pub snapshot_prefix: String,

    #[serde(default = "default_top_current")]
    pub top_current: usize,

    #[serde(default = "default_top_yearly")]
    pub top_yearly: usize,

    #[serde(default = "default_top_scores")]
    pub top_scores: usize,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no collections configured")]
    Empty,

    #[error("duplicate collection name `{0}`")]
    DuplicateName(String),

    #[error("duplicate collection id `{0}`")]
    DuplicateId(String),

    #[error("collection `{name}` has non-positive multiplier {multiplier}")]
    InvalidMultiplier { name: String, multiplier: i64 },
}

fn default_time_zone() -> Tz {
    chrono_tz::America::Los_Angeles
}

fn default_log_prefix() -> String {
    "playlist_log".into()
}

fn default_snapshot_prefix() -> String {
    "snapshot".into()
}

fn default_top_current() -> usize {
    10
}

fn default_top_yearly() -> usize {
    3
}

fn default_top_scores() -> usize {
    25
}

impl TrackerConfig {
    /// Built-in configuration (used if no config is provided).
    pub fn default_config() -> Self {
        let collection = |name: &str, id: &str, points, multiplier| CollectionConfig {
            name: name.into(),
            id: id.into(),
            points,
            multiplier,
        };

        Self {
            time_zone: default_time_zone(),
            collections: vec![
                collection("ssssss", "4B7tWbwr8fspGOEuNzSFVd", Some(1), None),
                collection("0.5", "3gjKqrz2I8Ex8Yh30WmG8B", Some(3), None),
                collection("1", "6dfLHXWKCQKkb3zZnJvjJg", Some(10), None),
                collection("2", "0lE4P0uoqvtNVAMCa8gTYP", None, Some(2)),
                collection("3", "1YRoyVyruSZWLNJo6eW3Rq", None, Some(3)),
            ],
            log_prefix: default_log_prefix(),
            snapshot_prefix: default_snapshot_prefix(),
            top_current: default_top_current(),
            top_yearly: default_top_yearly(),
            top_scores: default_top_scores(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collections.is_empty() {
            return Err(ConfigError::Empty);
        }

        let mut names = HashSet::new();
        let mut ids = HashSet::new();
        for collection in &self.collections {
            if !names.insert(collection.name.as_str()) {
                return Err(ConfigError::DuplicateName(collection.name.clone()));
            }
            if !ids.insert(collection.id.as_str()) {
                return Err(ConfigError::DuplicateId(collection.id.clone()));
            }
            if let Some(multiplier) = collection.multiplier {
                if multiplier <= 0 {
                    return Err(ConfigError::InvalidMultiplier {
                        name: collection.name.clone(),
                        multiplier,
                    });
                }
            }
        }

        Ok(())
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionConfig> {
        self.collections.iter().find(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = TrackerConfig::default_config();
        config.validate().unwrap();
        assert_eq!(config.collection("1").unwrap().points, Some(10));
        assert_eq!(config.collection("3").unwrap().multiplier, Some(3));
    }

    #[test]
    fn parses_minimal_json_with_defaults() {
        let json = r#"
        {
          "time_zone": "Europe/Rome",
          "collections": [
            { "name": "rock", "id": "abc", "points": 2 },
            { "name": "x2", "id": "def", "multiplier": 2 }
          ]
        }
        "#;

        let config: TrackerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.time_zone, chrono_tz::Europe::Rome);
        assert_eq!(config.log_prefix, "playlist_log");
        assert_eq!(config.top_yearly, 3);
        config.validate().unwrap();
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut config = TrackerConfig::default_config();
        config.collections[1].name = "ssssss".into();

        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::DuplicateName("ssssss".into())
        );
    }

    #[test]
    fn zero_multiplier_is_rejected() {
        let mut config = TrackerConfig::default_config();
        config.collections[3].multiplier = Some(0);

        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::InvalidMultiplier { .. }
        ));
    }
}
