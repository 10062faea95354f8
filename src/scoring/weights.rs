//! Class weight table
//!
//! Maps quality labels to integers so a probability distribution can be
//! summarized as a single weighted sum. The table is assembled at startup
//! (built-in defaults, config file, then `--class-weight` options) and is
//! read-only for the rest of the run.

use crate::config::ConfigError;
use crate::model::Score;
use std::collections::BTreeMap;

/// Built-in weights for the assessment scales of several wikis
pub const DEFAULT_CLASS_WEIGHTS: &[(&str, i64)] = &[
    // English
    ("Stub", 0),
    ("Start", 1),
    ("C", 2),
    ("B", 3),
    ("GA", 4),
    ("FA", 5),
    // Portuguese
    ("e", 0),
    ("bd", 1),
    ("b", 2),
    ("a", 3),
    ("ba", 4),
    ("adq", 5),
    // Russian
    ("ИС", 6),
    ("ХС", 5),
    ("ДС", 4),
    ("I", 3),
    ("II", 2),
    ("III", 1),
    ("IV", 0),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassWeights(BTreeMap<String, i64>);

impl Default for ClassWeights {
    fn default() -> Self {
        Self(
            DEFAULT_CLASS_WEIGHTS
                .iter()
                .map(|&(label, weight)| (label.to_string(), weight))
                .collect(),
        )
    }
}

impl ClassWeights {
    /// A table with no entries
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, label: &str) -> Option<i64> {
        self.0.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Apply `(label, weight)` pairs, replacing existing entries
    pub fn with_overrides<I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (String, i64)>,
    {
        self.0.extend(overrides);
        self
    }

    /// Parse and apply `Label=Weight` options
    pub fn apply_options<S: AsRef<str>>(self, options: &[S]) -> Result<Self, ConfigError> {
        let parsed = options
            .iter()
            .map(|o| parse_override(o.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.with_overrides(parsed))
    }

    /// Every label the model can predict must have a weight
    pub fn check_labels(&self, labels: &[String]) -> Result<(), ConfigError> {
        match labels.iter().find(|l| !self.0.contains_key(l.as_str())) {
            Some(label) => Err(ConfigError::UnweightedLabel {
                label: label.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Sum of weight x probability over the distribution.
    ///
    /// Without a distribution the prediction counts as certain. Labels missing
    /// from the table contribute nothing.
    pub fn weighted_sum(&self, score: &Score) -> f64 {
        match &score.probability {
            Some(probability) => probability
                .iter()
                .map(|(label, p)| self.get(label).unwrap_or(0) as f64 * p)
                .sum(),
            None => self.get(&score.prediction).unwrap_or(0) as f64,
        }
    }
}

/// Parse one `Label=Weight` option. The label may be JSON-quoted.
pub fn parse_override(option: &str) -> Result<(String, i64), ConfigError> {
    let malformed = |reason: &str| ConfigError::MalformedClassWeight {
        value: option.to_string(),
        reason: reason.to_string(),
    };

    let (label, weight) = option
        .rsplit_once('=')
        .ok_or_else(|| malformed("expected Label=Weight"))?;

    let label = label.trim();
    let label = if label.starts_with('"') {
        serde_json::from_str::<String>(label).map_err(|_| malformed("label is not a valid quoted string"))?
    } else {
        label.to_string()
    };
    if label.is_empty() {
        return Err(malformed("empty label"));
    }

    let weight = weight
        .trim()
        .parse::<i64>()
        .map_err(|_| malformed("weight is not an integer"))?;

    Ok((label, weight))
}
