//! Result of running a job handler.

/// What a handler reports back to the dispatcher.
///
/// The dispatcher maps this one-to-one onto the terminal job statuses
/// `successful` and `failed`. Failures are permanent; there is no implicit
/// retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure { reason: String },
}

impl Outcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Failure reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Success => None,
            Self::Failure { reason } => Some(reason),
        }
    }
}
