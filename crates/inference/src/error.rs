use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("No inference artifact is loaded")]
    Unavailable,

    #[error("Failed to load model from {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("Model evaluation failed: {0}")]
    Run(String),

    #[error("Model produced a non-finite output: {0}")]
    NonFinite(f64),

    #[error("Inference task failed: {0}")]
    Join(String),
}
