//! Scoring adapter
//!
//! The one place where a failure to score a revision becomes data. Feature
//! errors, classification errors and panics inside the model all come back as
//! [`ScoringError`] values so the caller can log and move on.

use crate::model::{FeatureSolver, ModelError, QualityModel, Score};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

/// Why a single revision could not be scored
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Model panicked: {0}")]
    Panic(String),
}

/// Result of scoring one revision text
pub type ScoreOutcome = Result<Score, ScoringError>;

/// Solve the model's features against `text` and classify them
pub fn score_text(model: &dyn QualityModel, text: &str, return_features: bool) -> ScoreOutcome {
    match panic::catch_unwind(AssertUnwindSafe(|| solve_and_score(model, text, return_features))) {
        Ok(result) => result.map_err(ScoringError::from),
        Err(payload) => Err(ScoringError::Panic(panic_message(payload.as_ref()))),
    }
}

fn solve_and_score(model: &dyn QualityModel, text: &str, return_features: bool) -> Result<Score, ModelError> {
    let features = model.features();
    let values = FeatureSolver::new(text).solve(features)?;
    let score = model.score(&values)?;

    if !return_features {
        return Ok(score);
    }
    let named = features.iter().map(|f| f.name()).zip(values).collect();
    Ok(score.with_features(named))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LinearModel, ModelKind};
    use crate::scoring::testing::{FailingModel, PanickingModel};

    const MODEL_JSON: &str = r#"{
        "name": "adapter.test",
        "kind": "probability_classifier",
        "labels": ["Stub", "FA"],
        "features": [{"measure": "ref_tags"}, {"measure": "chars", "transform": "log1p"}],
        "coefficients": {"Stub": [-1.0, 0.0], "FA": [1.0, 0.0]},
        "intercepts": {"Stub": 1.0, "FA": -1.0}
    }"#;

    #[test]
    fn test_scores_text() {
        let model = LinearModel::from_json(MODEL_JSON).unwrap();
        let score = score_text(&model, "Plain text", false).unwrap();
        assert_eq!(score.prediction, "Stub");
        assert!(score.probability.is_some());
        assert!(score.features.is_none());

        let score = score_text(&model, "a<ref>x</ref><ref>y</ref><ref>z</ref>", false).unwrap();
        assert_eq!(score.prediction, "FA");
    }

    #[test]
    fn test_returns_named_features() {
        let model = LinearModel::from_json(MODEL_JSON).unwrap();
        let score = score_text(&model, "abc<ref/>", true).unwrap();
        let features = score.features.unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features["wikitext.ref_tags"], 1.0);
        assert!((features["log(wikitext.chars + 1)"] - 10f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_model_error_becomes_value() {
        let model = FailingModel::new(ModelKind::Classifier);
        let outcome = score_text(&model, "anything", false);
        assert!(matches!(outcome, Err(ScoringError::Model(ModelError::Classification(_)))));
    }

    #[test]
    fn test_panic_becomes_value() {
        let model = PanickingModel;
        match score_text(&model, "anything", false) {
            Err(ScoringError::Panic(message)) => assert!(message.contains("model exploded")),
            other => panic!("expected a panic error, got {:?}", other),
        }
    }
}
