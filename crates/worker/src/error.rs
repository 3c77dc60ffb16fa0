use museo_inference::InferenceError;

/// Error raised inside a job handler.
///
/// Anything except [`HandlerError::Cancelled`] becomes a failed job with the
/// error's message as the reason.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The worker is shutting down past its grace period. The job stays in
    /// `processing` and is recovered after the visibility timeout.
    #[error("Job cancelled by shutdown")]
    Cancelled,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),
}

#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to enqueue job: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Entrypoint '{0}' is already registered")]
    Duplicate(String),

    #[error("Entrypoint name must not be empty")]
    EmptyName,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}
