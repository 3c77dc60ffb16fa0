use std::sync::Arc;

use museo_core::types::DbId;
use museo_db::DbPool;
use museo_inference::InferenceEngine;
use tokio_util::sync::CancellationToken;

use crate::error::HandlerError;
use crate::producer::JobProducer;

/// Shared dependencies, constructed once at process start.
///
/// Passed to the dispatcher, to every handler invocation through
/// [`JobContext`], and to the producer.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub pool: DbPool,
    pub inference: InferenceEngine,
}

impl WorkerContext {
    pub fn new(pool: DbPool, inference: InferenceEngine) -> Self {
        Self { pool, inference }
    }

    /// A producer writing to the same queue store.
    pub fn producer(&self) -> JobProducer {
        JobProducer::new(self.pool.clone())
    }
}

/// Per-invocation context handed to a [`JobHandler`](crate::JobHandler).
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: DbId,
    pub entrypoint: String,
    /// Times this job was recovered from a consumer that stopped heartbeating.
    pub retry_count: i32,
    pub worker: Arc<WorkerContext>,
    cancel: CancellationToken,
}

impl JobContext {
    pub fn new(
        job_id: DbId,
        entrypoint: impl Into<String>,
        retry_count: i32,
        worker: Arc<WorkerContext>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            job_id,
            entrypoint: entrypoint.into(),
            retry_count,
            worker,
            cancel,
        }
    }

    /// Return [`HandlerError::Cancelled`] once the worker gave up waiting for
    /// this job. Handlers call this before each step that writes.
    pub fn check_cancelled(&self) -> Result<(), HandlerError> {
        if self.cancel.is_cancelled() {
            Err(HandlerError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves when the invocation is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}
