//! Scoring model trait definitions
//!
//! Defines the contract the scoring pipeline relies on. A model declares the
//! features it needs and turns a vector of their values into a [`Score`].

use super::features::{Feature, FeatureError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Errors that can occur while loading or invoking a model
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Model file could not be read
    #[error("Failed to read model file: {0}")]
    Io(#[from] std::io::Error),

    /// Model file is not a valid definition
    #[error("Failed to parse model definition: {0}")]
    Parse(#[from] serde_json::Error),

    /// Definition parsed but is internally inconsistent
    #[error("Invalid model definition: {0}")]
    Invalid(String),

    /// A feature could not be computed
    #[error("Feature extraction failed: {0}")]
    Feature(#[from] FeatureError),

    /// The classifier rejected its input
    #[error("Classification failed: {0}")]
    Classification(String),
}

/// Whether a model reports a probability distribution over its labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Produces a single predicted label
    Classifier,
    /// Produces a predicted label and a label -> probability map
    ProbabilityClassifier,
}

impl ModelKind {
    pub fn has_probability(&self) -> bool {
        matches!(self, ModelKind::ProbabilityClassifier)
    }
}

/// Output of a single scoring call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Score {
    /// Predicted label
    pub prediction: String,
    /// Label -> probability, for probability classifiers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<BTreeMap<String, f64>>,
    /// Feature name -> value, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<BTreeMap<String, f64>>,
}

impl Score {
    pub fn new(prediction: impl Into<String>) -> Self {
        Self {
            prediction: prediction.into(),
            probability: None,
            features: None,
        }
    }

    pub fn with_probability(mut self, probability: BTreeMap<String, f64>) -> Self {
        self.probability = Some(probability);
        self
    }

    pub fn with_features(mut self, features: BTreeMap<String, f64>) -> Self {
        self.features = Some(features);
        self
    }
}

/// Core trait for quality models
///
/// The trait is object-safe so a loaded model can be shared across worker
/// threads as `Arc<dyn QualityModel>`.
pub trait QualityModel: Send + Sync + Debug {
    /// Model name, for logging
    fn name(&self) -> &str;

    /// Capability of the model, fixed for its lifetime
    fn kind(&self) -> ModelKind;

    /// Every label the model can predict
    fn labels(&self) -> &[String];

    /// Features the model consumes, in the order `score` expects them
    fn features(&self) -> &[Feature];

    /// Classify a vector of feature values
    fn score(&self, values: &[f64]) -> Result<Score, ModelError>;
}
