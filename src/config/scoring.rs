//! Scoring defaults

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Defaults for a scoring run, overridden by command-line flags
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Sampling policy: revision, monthly, biannually, annually or latest
    pub score_at: String,
    /// Concurrent dump files (default: available parallelism)
    pub processes: Option<usize>,
    /// Label -> weight, applied on top of the built-in table
    pub class_weights: BTreeMap<String, i64>,
    /// First year of the threshold calendar
    pub start_year: i32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            score_at: "latest".to_string(),
            processes: None,
            class_weights: BTreeMap::new(),
            start_year: crate::scoring::calendar::START_YEAR,
        }
    }
}

impl ScoringConfig {
    /// Worker count to use when neither the config nor the command line sets one
    pub fn default_processes() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}
