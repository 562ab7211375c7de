//! Layered configuration for `newsd`.
//!
//! Sources, later ones winning:
//! 1. Built-in defaults
//! 2. `~/.config/news-pulse/config.toml`
//! 3. A file passed with `--config`
//! 4. Environment variables (`NEWS_*`, nested keys joined with `__`)
//! 5. CLI flags, applied by the caller

use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::{BaseDirs, ProjectDirs};
use news_embeddings::EmbeddingConfig;
use news_events::EventsConfig;
use news_scheduler::{JobsConfig, SchedulerConfig};
use news_topics::TopicsConfig;
use news_types::NewsError;
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "news-pulse";

/// Main application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the RocksDB directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Embedding model and retry budget
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Grouping, lifecycle and labeling thresholds
    #[serde(default)]
    pub events: EventsConfig,

    /// Topic clustering and hierarchy thresholds
    #[serde(default)]
    pub topics: TopicsConfig,

    /// Scheduler defaults
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Per-job schedules
    #[serde(default)]
    pub jobs: JobsConfig,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", APP_NAME)
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
            embedding: EmbeddingConfig::default(),
            events: EventsConfig::default(),
            topics: TopicsConfig::default(),
            scheduler: SchedulerConfig::default(),
            jobs: JobsConfig::default(),
        }
    }
}

fn config_error(e: impl ToString) -> NewsError {
    NewsError::Config(e.to_string())
}

impl Settings {
    /// Default config file location, without extension.
    pub fn default_config_path() -> PathBuf {
        ProjectDirs::from("", "", APP_NAME)
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config")
    }

    /// Load settings from every layer except CLI flags.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, NewsError> {
        Self::load_from(&Self::default_config_path(), cli_config_path)
    }

    /// Load settings with an explicit default config location.
    pub fn load_from(
        default_config_path: &std::path::Path,
        cli_config_path: Option<&str>,
    ) -> Result<Self, NewsError> {
        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(config_error)?
            .set_default("log_level", default_log_level())
            .map_err(config_error)?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // NEWS_DB_PATH, NEWS_EVENTS__GROUPING__SIMILARITY_THRESHOLD, ...
        builder = builder.add_source(
            Environment::with_prefix("NEWS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .map_err(config_error)?
            .try_deserialize()
            .map_err(config_error)
    }

    /// Reject invalid thresholds, windows, vocabularies and schedules.
    pub fn validate(&self) -> Result<(), NewsError> {
        if self.db_path.trim().is_empty() {
            return Err(NewsError::Config("db_path must not be empty".to_string()));
        }
        self.embedding.validate().map_err(config_error)?;
        self.events.validate().map_err(config_error)?;
        self.topics.validate().map_err(config_error)?;
        self.scheduler.parse_timezone().map_err(config_error)?;
        self.jobs.validate().map_err(config_error)?;
        Ok(())
    }

    /// `db_path` with a leading `~/` expanded to the home directory.
    pub fn expanded_db_path(&self) -> PathBuf {
        if let Some(rest) = self.db_path.strip_prefix("~/") {
            if let Some(dirs) = BaseDirs::new() {
                return dirs.home_dir().join(rest);
            }
        }
        PathBuf::from(&self.db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn missing_default(temp: &TempDir) -> PathBuf {
        temp.path().join("absent")
    }

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.events.grouping.similarity_threshold, 0.75);
        assert_eq!(settings.topics.detection.min_samples, 2);
        settings.validate().unwrap();
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::load_from(&missing_default(&temp), None).unwrap();
        assert_eq!(settings.events.lifecycle.merge_threshold, 0.85);
        assert_eq!(settings.jobs, JobsConfig::default());
    }

    #[test]
    fn test_cli_file_overrides_nested_sections() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("newsd.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
db_path = "/var/lib/newsd"

[events.lifecycle]
staleness_hours = 48

[topics.detection]
eps = 0.25

[jobs.topic_detection]
cron = "0 0 * * * *"
enabled = false
"#
        )
        .unwrap();

        let settings =
            Settings::load_from(&missing_default(&temp), Some(path.to_str().unwrap())).unwrap();
        assert_eq!(settings.db_path, "/var/lib/newsd");
        assert_eq!(settings.events.lifecycle.staleness_hours, 48);
        assert_eq!(settings.events.lifecycle.merge_threshold, 0.85);
        assert_eq!(settings.topics.detection.eps, 0.25);
        assert!(!settings.jobs.topic_detection.enabled);
        assert_eq!(settings.jobs.event_labeling, JobsConfig::default().event_labeling);
        settings.validate().unwrap();
    }

    #[test]
    fn test_missing_cli_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let result = Settings::load_from(&missing_default(&temp), Some("/nonexistent/newsd.toml"));
        assert!(matches!(result, Err(NewsError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut settings = Settings::default();
        settings.events.grouping.similarity_threshold = 1.5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.topics.detection.min_samples = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.jobs.event_detection.cron = "every minute".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("defaults.toml");
        std::fs::write(&path, toml::to_string(&Settings::default()).unwrap()).unwrap();

        let loaded =
            Settings::load_from(&missing_default(&temp), Some(path.to_str().unwrap())).unwrap();
        assert_eq!(loaded.jobs, JobsConfig::default());
        assert_eq!(
            loaded.events.labeling.categories,
            Settings::default().events.labeling.categories
        );
    }

    #[test]
    fn test_expanded_db_path() {
        let settings = Settings {
            db_path: "/tmp/news".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.expanded_db_path(), PathBuf::from("/tmp/news"));

        let settings = Settings {
            db_path: "~/news".to_string(),
            ..Default::default()
        };
        assert!(!settings.expanded_db_path().starts_with("~"));
    }
}
