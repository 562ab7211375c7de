//! Event engine configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::EventsError;
use crate::taxonomy::{default_categories, default_taxonomy, TopicClass};

/// Master configuration for event detection, lifecycle and labeling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Similarity grouping settings
    #[serde(default)]
    pub grouping: GroupingConfig,

    /// Merge and staleness settings
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Label engine settings
    #[serde(default)]
    pub labeling: LabelingConfig,
}

impl EventsConfig {
    /// Validate every section. Called before any processing begins.
    pub fn validate(&self) -> Result<(), EventsError> {
        self.grouping.validate()?;
        self.lifecycle.validate()?;
        self.labeling.validate()
    }
}

/// Similarity grouper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupingConfig {
    /// Minimum cosine similarity between a seed and a group member
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Width of one grouping window in hours
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,

    /// How far back a detection run reads articles, in hours
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u32,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            window_hours: default_window_hours(),
            lookback_hours: default_lookback_hours(),
        }
    }
}

fn default_similarity_threshold() -> f32 {
    0.75
}

fn default_window_hours() -> u32 {
    12
}

fn default_lookback_hours() -> u32 {
    24
}

impl GroupingConfig {
    pub fn validate(&self) -> Result<(), EventsError> {
        check_threshold("grouping.similarity_threshold", self.similarity_threshold)?;
        check_nonzero("grouping.window_hours", self.window_hours)?;
        check_nonzero("grouping.lookback_hours", self.lookback_hours)
    }

    pub fn window(&self) -> Duration {
        Duration::hours(i64::from(self.window_hours))
    }

    pub fn lookback(&self) -> Duration {
        Duration::hours(i64::from(self.lookback_hours))
    }
}

/// Event lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Minimum title similarity for merging into an active event
    #[serde(default = "default_merge_threshold")]
    pub merge_threshold: f32,

    /// Active events considered as merge targets, by start time, in hours
    #[serde(default = "default_merge_lookback_hours")]
    pub merge_lookback_hours: u32,

    /// Age after which an active event is closed, in hours
    #[serde(default = "default_staleness_hours")]
    pub staleness_hours: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            merge_threshold: default_merge_threshold(),
            merge_lookback_hours: default_merge_lookback_hours(),
            staleness_hours: default_staleness_hours(),
        }
    }
}

fn default_merge_threshold() -> f32 {
    0.85
}

fn default_merge_lookback_hours() -> u32 {
    24
}

fn default_staleness_hours() -> u32 {
    24
}

impl LifecycleConfig {
    pub fn validate(&self) -> Result<(), EventsError> {
        check_threshold("lifecycle.merge_threshold", self.merge_threshold)?;
        check_nonzero("lifecycle.merge_lookback_hours", self.merge_lookback_hours)?;
        check_nonzero("lifecycle.staleness_hours", self.staleness_hours)
    }

    pub fn merge_lookback(&self) -> Duration {
        Duration::hours(i64::from(self.merge_lookback_hours))
    }

    pub fn staleness(&self) -> Duration {
        Duration::hours(i64::from(self.staleness_hours))
    }
}

/// Event label engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelingConfig {
    /// Minimum similarity for a category label
    #[serde(default = "default_label_threshold")]
    pub category_threshold: f32,

    /// Minimum mean keyword similarity for a topic-class label
    #[serde(default = "default_label_threshold")]
    pub class_threshold: f32,

    /// Category vocabulary
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,

    /// Topic-class taxonomy
    #[serde(default = "default_taxonomy")]
    pub taxonomy: Vec<TopicClass>,
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            category_threshold: default_label_threshold(),
            class_threshold: default_label_threshold(),
            categories: default_categories(),
            taxonomy: default_taxonomy(),
        }
    }
}

fn default_label_threshold() -> f32 {
    0.7
}

impl LabelingConfig {
    pub fn validate(&self) -> Result<(), EventsError> {
        check_threshold("labeling.category_threshold", self.category_threshold)?;
        check_threshold("labeling.class_threshold", self.class_threshold)?;

        if self.categories.iter().all(|c| c.trim().is_empty()) {
            return Err(EventsError::InvalidConfig(
                "labeling.categories must not be empty".to_string(),
            ));
        }
        if self.taxonomy.is_empty() {
            return Err(EventsError::InvalidConfig(
                "labeling.taxonomy must not be empty".to_string(),
            ));
        }
        if let Some(class) = self.taxonomy.iter().find(|c| c.keywords.is_empty()) {
            return Err(EventsError::InvalidConfig(format!(
                "labeling.taxonomy class {} has no keywords",
                class.name
            )));
        }
        Ok(())
    }
}

pub(crate) fn check_threshold(name: &str, value: f32) -> Result<(), EventsError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(EventsError::InvalidConfig(format!(
            "{} must be in [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

fn check_nonzero(name: &str, value: u32) -> Result<(), EventsError> {
    if value == 0 {
        return Err(EventsError::InvalidConfig(format!("{} must be > 0", name)));
    }
    Ok(())
}
