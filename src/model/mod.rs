//! Quality models and the features they consume

pub mod features;
pub mod linear;
pub mod traits;
pub mod wikitext;

pub use features::{Feature, FeatureError, FeatureSolver, Measure, Transform};
pub use linear::LinearModel;
pub use traits::{ModelError, ModelKind, QualityModel, Score};
pub use wikitext::WikiTextParser;

use std::path::Path;
use std::sync::Arc;

/// Load a model file into a shareable handle
pub fn load_model(path: &Path) -> Result<Arc<dyn QualityModel>, ModelError> {
    let model = LinearModel::load(path)?;
    Ok(Arc::new(model))
}
