//! Topic configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::TopicsError;

/// Master configuration for topic aggregation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicsConfig {
    /// Clustering settings
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Parent/child inference settings
    #[serde(default)]
    pub hierarchy: HierarchyConfig,
}

impl TopicsConfig {
    pub fn validate(&self) -> Result<(), TopicsError> {
        self.detection.validate()?;
        self.hierarchy.validate()
    }
}

/// Topic detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// How many days of events are clustered
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Minimum linked articles for an event to be clustered
    #[serde(default = "default_min_articles")]
    pub min_articles: u64,

    /// Neighborhood radius in cosine distance (1 - similarity)
    #[serde(default = "default_eps")]
    pub eps: f32,

    /// Neighbors (the point itself included) needed for a core point
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            min_articles: default_min_articles(),
            eps: default_eps(),
            min_samples: default_min_samples(),
        }
    }
}

fn default_lookback_days() -> u32 {
    7
}

fn default_min_articles() -> u64 {
    3
}

fn default_eps() -> f32 {
    0.3
}

fn default_min_samples() -> usize {
    2
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), TopicsError> {
        if self.lookback_days == 0 {
            return Err(TopicsError::InvalidConfig(
                "detection.lookback_days must be > 0".to_string(),
            ));
        }
        if !(self.eps > 0.0 && self.eps <= 2.0) {
            return Err(TopicsError::InvalidConfig(format!(
                "detection.eps must be in (0, 2], got {}",
                self.eps
            )));
        }
        if self.min_samples == 0 {
            return Err(TopicsError::InvalidConfig(
                "detection.min_samples must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn lookback(&self) -> Duration {
        Duration::days(i64::from(self.lookback_days))
    }
}

/// Hierarchy inference configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// Minimum similarity for an older topic to become a parent
    #[serde(default = "default_parent_threshold")]
    pub parent_threshold: f32,

    /// Minimum similarity for a younger topic to become a child
    #[serde(default = "default_child_threshold")]
    pub child_threshold: f32,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            parent_threshold: default_parent_threshold(),
            child_threshold: default_child_threshold(),
        }
    }
}

fn default_parent_threshold() -> f32 {
    0.8
}

fn default_child_threshold() -> f32 {
    0.7
}

impl HierarchyConfig {
    pub fn validate(&self) -> Result<(), TopicsError> {
        for (name, value) in [
            ("hierarchy.parent_threshold", self.parent_threshold),
            ("hierarchy.child_threshold", self.child_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(TopicsError::InvalidConfig(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TopicsConfig::default();
        assert_eq!(config.detection.lookback_days, 7);
        assert_eq!(config.detection.min_articles, 3);
        assert!((config.detection.eps - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.detection.min_samples, 2);
        assert!((config.hierarchy.parent_threshold - 0.8).abs() < f32::EPSILON);
        assert!((config.hierarchy.child_threshold - 0.7).abs() < f32::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_min_samples() {
        let mut config = TopicsConfig::default();
        config.detection.min_samples = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let mut config = TopicsConfig::default();
        config.hierarchy.parent_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: TopicsConfig = serde_json::from_str(r#"{"detection":{"eps":0.2}}"#).unwrap();
        assert!((config.detection.eps - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.detection.min_samples, 2);
        assert!((config.hierarchy.child_threshold - 0.7).abs() < f32::EPSILON);
    }
}
