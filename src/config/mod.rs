//! Configuration for extract-scores

mod logging;
mod scoring;

pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use scoring::ScoringConfig;

use crate::model::ModelError;
use crate::scoring::calendar::ScoreAt;
use crate::types::TimestampError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file read when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "extract-scores.toml";

/// Problems detected before any dump is read
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("score-at value '{value}' not available in {{revision, monthly, biannually, annually, latest}}")]
    UnknownScoreAt { value: String },

    #[error("Malformed class weight '{value}': {reason}")]
    MalformedClassWeight { value: String, reason: String },

    #[error("Model label '{label}' has no class weight; add one with --class-weight")]
    UnweightedLabel { label: String },

    #[error("Invalid sunset: {0}")]
    Sunset(#[from] TimestampError),

    #[error("Failed to load model '{}': {source}", path.display())]
    Model {
        path: PathBuf,
        #[source]
        source: ModelError,
    },

    #[error("Process count must be positive")]
    InvalidProcesses,
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate all configuration fields, reporting every problem at once
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if let Err(e) = self.scoring.score_at.parse::<ScoreAt>() {
            errors.push(e.to_string());
        }
        if self.scoring.processes == Some(0) {
            errors.push("processes must be positive".to_string());
        }
        if !(1..=9999).contains(&self.scoring.start_year) {
            errors.push(format!(
                "start_year must be between 1 and 9999, got {}",
                self.scoring.start_year
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}
