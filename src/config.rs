//! Engine configuration, loaded from an optional TOML file.
//!
//! ```toml
//! database_path = "study.sqlite3"
//! max_questions = 10
//! review_queue_limit = 20
//! clock = "simulated"
//! ```

use crate::engine::adaptive::DEFAULT_MAX_QUESTIONS;
use crate::engine::priority::DEFAULT_QUEUE_LIMIT;
use crate::error::{EngineError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockMode {
    /// Wall-clock time.
    #[default]
    System,
    /// The date stored in the database, moved forward with `advance_day`.
    Simulated,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub database_path: PathBuf,
    /// Answers after which an adaptive attempt completes.
    pub max_questions: usize,
    pub review_queue_limit: usize,
    pub clock: ClockMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("db.sqlite3"),
            max_questions: DEFAULT_MAX_QUESTIONS,
            review_queue_limit: DEFAULT_QUEUE_LIMIT,
            clock: ClockMode::System,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(contents).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the file if given, otherwise returns the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_toml_str(&fs::read_to_string(path)?),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_questions == 0 {
            return Err(EngineError::Config(
                "max_questions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::load(None).unwrap();
        assert_eq!(config.max_questions, 10);
        assert_eq!(config.review_queue_limit, 20);
        assert_eq!(config.clock, ClockMode::System);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = EngineConfig::from_toml_str("clock = \"simulated\"\nmax_questions = 5\n").unwrap();
        assert_eq!(config.clock, ClockMode::Simulated);
        assert_eq!(config.max_questions, 5);
        assert_eq!(config.review_queue_limit, 20);
        assert_eq!(config.database_path, PathBuf::from("db.sqlite3"));
    }

    #[test]
    fn test_rejects_zero_questions() {
        let err = EngineConfig::from_toml_str("max_questions = 0").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_clock() {
        assert!(EngineConfig::from_toml_str("clock = \"lunar\"").is_err());
    }
}
