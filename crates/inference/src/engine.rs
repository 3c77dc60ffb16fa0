use std::path::Path;
use std::sync::Arc;

use museo_core::prediction::floor_output;

use crate::error::InferenceError;
use crate::onnx::OnnxModel;

/// A loaded regression model mapping city population to yearly visitors.
///
/// Implementations must be safe to call from several threads at once.
pub trait Predictor: Send + Sync {
    /// Evaluate the model and return its raw, unrounded output.
    fn predict_raw(&self, population: i64) -> Result<f64, InferenceError>;
}

/// Process-wide handle on the inference artifact.
///
/// Cheap to clone; every clone shares the same loaded model.
#[derive(Clone)]
pub struct InferenceEngine {
    predictor: Option<Arc<dyn Predictor>>,
}

impl InferenceEngine {
    /// Load the ONNX artifact at `path`.
    ///
    /// A missing file or a load failure is not fatal: the engine starts in
    /// degraded mode and [`is_available`](Self::is_available) returns `false`.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Model not found, predictions are disabled until it is trained",
            );
            return Self::unavailable();
        }

        match OnnxModel::load(path) {
            Ok(model) => {
                tracing::info!(path = %model.path().display(), "Loaded ONNX model");
                Self::from_predictor(Arc::new(model))
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load ONNX model, predictions are disabled");
                Self::unavailable()
            }
        }
    }

    /// An engine with no artifact.
    pub fn unavailable() -> Self {
        Self { predictor: None }
    }

    pub fn from_predictor(predictor: Arc<dyn Predictor>) -> Self {
        Self {
            predictor: Some(predictor),
        }
    }

    pub fn is_available(&self) -> bool {
        self.predictor.is_some()
    }

    /// Predict yearly visitors for `population`, floored to an integer.
    ///
    /// The result may be negative; clamping is the caller's concern.
    pub fn predict(&self, population: i64) -> Result<i64, InferenceError> {
        let predictor = self.predictor.as_ref().ok_or(InferenceError::Unavailable)?;
        let raw = predictor.predict_raw(population)?;
        floor_output(raw).ok_or(InferenceError::NonFinite(raw))
    }

    /// [`predict`](Self::predict) on the blocking thread pool, keeping
    /// compute off the async workers.
    pub async fn predict_offloaded(&self, population: i64) -> Result<i64, InferenceError> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.predict(population))
            .await
            .map_err(|e| InferenceError::Join(e.to_string()))?
    }
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("available", &self.is_available())
            .finish()
    }
}
