//! Configuration for the review core
//!
//! Loaded from a TOML file; every field has a default so an empty file is a
//! valid configuration.
//!
//! ```toml
//! data_dir = "/home/me/.local/share/recall"
//! learner = "me"
//!
//! [session]
//! item_type = "flashcard"
//! create_timeout_ms = 5000
//!
//! [persistence]
//! mode = "outbox"
//! initial_backoff_ms = 1000
//! max_backoff_ms = 300000
//! flush_interval_secs = 30
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::review::{FlusherTiming, ItemType, SessionOptions};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Could not determine a data directory")]
    NoDataDir,
}

/// How persistence jobs reach the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PersistMode {
    /// Send each job straight to the store, drop it on failure
    BestEffort,
    /// Write jobs to the local outbox and deliver them with retries
    #[default]
    Outbox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub item_type: ItemType,
    pub course_scope: Option<String>,
    pub create_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            item_type: ItemType::Flashcard,
            course_scope: None,
            create_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub mode: PersistMode,
    /// Outbox log location; defaults to `{data_dir}/{learner}/outbox.jsonl`
    pub outbox_path: Option<PathBuf>,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub flush_interval_secs: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            mode: PersistMode::Outbox,
            outbox_path: None,
            initial_backoff_ms: 1000,
            max_backoff_ms: 300_000,
            flush_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Root directory for the file-backed store
    pub data_dir: Option<PathBuf>,
    pub learner: String,
    pub session: SessionConfig,
    pub persistence: PersistenceConfig,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            learner: "default".to_string(),
            session: SessionConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl ReviewConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: ReviewConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.learner.is_empty()
            || self.learner.contains(['/', '\\'])
            || self.learner == "."
            || self.learner == ".."
        {
            return Err(ConfigError::Invalid(format!(
                "learner '{}' must be a plain directory name",
                self.learner
            )));
        }

        let p = &self.persistence;
        if p.initial_backoff_ms == 0 {
            return Err(ConfigError::Invalid("initial_backoff_ms must be positive".to_string()));
        }
        if p.max_backoff_ms < p.initial_backoff_ms {
            return Err(ConfigError::Invalid(
                "max_backoff_ms must be at least initial_backoff_ms".to_string(),
            ));
        }
        if p.flush_interval_secs == 0 {
            return Err(ConfigError::Invalid("flush_interval_secs must be positive".to_string()));
        }
        if self.session.create_timeout_ms == 0 {
            return Err(ConfigError::Invalid("create_timeout_ms must be positive".to_string()));
        }

        Ok(())
    }

    /// Store root, falling back to the platform data directory
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|d| d.join("recall"))
                .ok_or(ConfigError::NoDataDir),
        }
    }

    pub fn outbox_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.persistence.outbox_path {
            Some(path) => Ok(path.clone()),
            None => Ok(self.data_dir()?.join(&self.learner).join("outbox.jsonl")),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            item_type: self.session.item_type,
            course_scope: self.session.course_scope.clone(),
            create_timeout: Duration::from_millis(self.session.create_timeout_ms),
        }
    }

    pub fn flusher_timing(&self) -> FlusherTiming {
        FlusherTiming {
            initial_backoff: Duration::from_millis(self.persistence.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.persistence.max_backoff_ms),
            flush_interval: Duration::from_secs(self.persistence.flush_interval_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = ReviewConfig::from_toml("").unwrap();
        assert_eq!(config, ReviewConfig::default());
        assert_eq!(config.persistence.mode, PersistMode::Outbox);
        assert_eq!(config.session_options().create_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_full_file() {
        let config = ReviewConfig::from_toml(
            r#"
            data_dir = "/tmp/recall"
            learner = "ada"

            [session]
            item_type = "question"
            course_scope = "calculus-1"

            [persistence]
            mode = "best-effort"
            initial_backoff_ms = 250
            max_backoff_ms = 1000
            "#,
        )
        .unwrap();

        assert_eq!(config.learner, "ada");
        assert_eq!(config.session.item_type, ItemType::Question);
        assert_eq!(config.persistence.mode, PersistMode::BestEffort);
        assert_eq!(config.persistence.flush_interval_secs, 30);
        assert_eq!(
            config.outbox_path().unwrap(),
            PathBuf::from("/tmp/recall/ada/outbox.jsonl")
        );
        assert_eq!(config.flusher_timing().initial_backoff, Duration::from_millis(250));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            ReviewConfig::from_toml("learner = \"../etc\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ReviewConfig::from_toml("[persistence]\ninitial_backoff_ms = 5000\nmax_backoff_ms = 10"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ReviewConfig::from_toml("[persistence]\nmode = \"sometimes\""),
            Err(ConfigError::Toml(_))
        ));
    }
}
