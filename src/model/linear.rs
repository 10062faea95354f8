//! Linear quality model defined in JSON
//!
//! ```json
//! {
//!   "name": "enwiki.wp10",
//!   "version": "0.1.0",
//!   "kind": "probability_classifier",
//!   "labels": ["Stub", "Start", "C", "B", "GA", "FA"],
//!   "features": [{"measure": "content_chars", "transform": "log1p"}, {"measure": "ref_tags"}],
//!   "coefficients": {"Stub": [-0.8, -0.2], "Start": [0.1, 0.0], ...},
//!   "intercepts": {"Stub": 4.0, "Start": 1.0, ...}
//! }
//! ```
//!
//! Each label gets a linear score `intercept + coefficients · features`.
//! Probability classifiers report the softmax of those scores; the prediction
//! is the highest-scoring label, first label winning ties.

use super::features::Feature;
use super::traits::{ModelError, ModelKind, QualityModel, Score};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

#[derive(Debug, Deserialize)]
struct LinearModelDefinition {
    name: String,
    #[serde(default)]
    version: Option<String>,
    kind: ModelKind,
    labels: Vec<String>,
    features: Vec<Feature>,
    coefficients: HashMap<String, Vec<f64>>,
    #[serde(default)]
    intercepts: HashMap<String, f64>,
}

/// Multinomial linear classifier over wikitext features
#[derive(Debug, Clone)]
pub struct LinearModel {
    name: String,
    kind: ModelKind,
    labels: Vec<String>,
    features: Vec<Feature>,
    /// One row per label, aligned with `labels`
    weights: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
}

impl LinearModel {
    /// Load a model definition from a JSON file
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse and validate a JSON model definition
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let definition: LinearModelDefinition = serde_json::from_str(json)?;
        Self::from_definition(definition)
    }

    fn from_definition(mut def: LinearModelDefinition) -> Result<Self, ModelError> {
        if def.labels.is_empty() {
            return Err(ModelError::Invalid("model declares no labels".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = def.labels.iter().find(|l| !seen.insert(l.as_str())) {
            return Err(ModelError::Invalid(format!("duplicate label '{}'", dup)));
        }

        let mut errors = Vec::new();
        let mut weights = Vec::with_capacity(def.labels.len());
        let mut intercepts = Vec::with_capacity(def.labels.len());

        for label in &def.labels {
            match def.coefficients.remove(label) {
                Some(row) if row.len() == def.features.len() => weights.push(row),
                Some(row) => errors.push(format!(
                    "label '{}' has {} coefficients, expected {}",
                    label,
                    row.len(),
                    def.features.len()
                )),
                None => errors.push(format!("label '{}' has no coefficients", label)),
            }
            intercepts.push(def.intercepts.get(label).copied().unwrap_or(0.0));
        }

        let mut unknown: Vec<_> = def.coefficients.keys().cloned().collect();
        unknown.sort();
        for label in unknown {
            errors.push(format!("coefficients given for unknown label '{}'", label));
        }

        if !errors.is_empty() {
            return Err(ModelError::Invalid(errors.join("; ")));
        }

        let name = match def.version {
            Some(version) => format!("{} ({})", def.name, version),
            None => def.name,
        };

        Ok(Self {
            name,
            kind: def.kind,
            labels: def.labels,
            features: def.features,
            weights,
            intercepts,
        })
    }

    fn decision_values(&self, values: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.intercepts)
            .map(|(row, bias)| bias + row.iter().zip(values).map(|(w, x)| w * x).sum::<f64>())
            .collect()
    }
}

impl QualityModel for LinearModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ModelKind {
        self.kind
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn features(&self) -> &[Feature] {
        &self.features
    }

    fn score(&self, values: &[f64]) -> Result<Score, ModelError> {
        if values.len() != self.features.len() {
            return Err(ModelError::Classification(format!(
                "expected {} feature values, got {}",
                self.features.len(),
                values.len()
            )));
        }

        let decision = self.decision_values(values);

        let mut best = 0;
        for (i, v) in decision.iter().enumerate() {
            if !v.is_finite() {
                return Err(ModelError::Classification(format!(
                    "decision value for '{}' is not finite ({})",
                    self.labels[i], v
                )));
            }
            if *v > decision[best] {
                best = i;
            }
        }

        let score = Score::new(self.labels[best].clone());
        if !self.kind.has_probability() {
            return Ok(score);
        }

        // Softmax, shifted by the maximum for numerical stability
        let max = decision[best];
        let exps: Vec<f64> = decision.iter().map(|v| (v - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        let probability: BTreeMap<String, f64> = self
            .labels
            .iter()
            .cloned()
            .zip(exps.iter().map(|e| e / total))
            .collect();

        Ok(score.with_probability(probability))
    }
}
