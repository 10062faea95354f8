//! Small in-test models

use crate::model::{Feature, Measure, ModelError, ModelKind, QualityModel, Score};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

fn labels() -> Vec<String> {
    vec!["Stub".to_string(), "FA".to_string()]
}

/// Predicts FA for texts longer than ten characters and counts its calls
#[derive(Debug)]
pub struct CountingModel {
    kind: ModelKind,
    labels: Vec<String>,
    features: Vec<Feature>,
    calls: AtomicUsize,
}

impl CountingModel {
    pub fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            labels: labels(),
            features: vec![Feature::new(Measure::Chars)],
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl QualityModel for CountingModel {
    fn name(&self) -> &str {
        "counting"
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
        self.calls.fetch_add(1, Ordering::SeqCst);
        let long = values[0] > 10.0;
        let score = Score::new(if long { "FA" } else { "Stub" });
        if !self.kind.has_probability() {
            return Ok(score);
        }
        let (p_stub, p_fa) = if long { (0.2, 0.8) } else { (0.8, 0.2) };
        let probability: BTreeMap<String, f64> =
            [("Stub".to_string(), p_stub), ("FA".to_string(), p_fa)].into_iter().collect();
        Ok(score.with_probability(probability))
    }
}

/// Refuses texts shorter than a minimum length
#[derive(Debug)]
pub struct FailingModel {
    kind: ModelKind,
    labels: Vec<String>,
    features: Vec<Feature>,
    min_chars: f64,
}

impl FailingModel {
    /// Fails on every text
    pub fn new(kind: ModelKind) -> Self {
        Self::below(kind, f64::INFINITY)
    }

    pub fn below(kind: ModelKind, min_chars: f64) -> Self {
        Self {
            kind,
            labels: labels(),
            features: vec![Feature::new(Measure::Chars)],
            min_chars,
        }
    }
}

impl QualityModel for FailingModel {
    fn name(&self) -> &str {
        "failing"
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
        if values[0] < self.min_chars {
            return Err(ModelError::Classification(format!(
                "text of {} chars is too short",
                values[0]
            )));
        }
        Ok(Score::new("FA"))
    }
}

#[derive(Debug)]
pub struct PanickingModel;

impl QualityModel for PanickingModel {
    fn name(&self) -> &str {
        "panicking"
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Classifier
    }

    fn labels(&self) -> &[String] {
        &[]
    }

    fn features(&self) -> &[Feature] {
        &[]
    }

    fn score(&self, _values: &[f64]) -> Result<Score, ModelError> {
        panic!("model exploded");
    }
}
