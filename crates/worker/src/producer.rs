//! Enqueue side of the job queue.

use museo_core::entrypoints::LOG_MUSEUM_CREATED;
use museo_core::payload::MuseumCreated;
use museo_core::types::{DbId, EntityId};
use museo_db::models::job::NewJob;
use museo_db::repositories::JobRepo;
use museo_db::DbPool;
use serde::Serialize;

use crate::error::ProducerError;

/// Priority given to jobs enqueued without an explicit one. Lower runs first.
pub const DEFAULT_PRIORITY: i32 = 0;

/// Client used by business code to hand work to the dispatcher.
///
/// Call after the business transaction has committed, so a consumer never
/// sees a job for rows it cannot read yet.
#[derive(Debug, Clone)]
pub struct JobProducer {
    pool: DbPool,
}

impl JobProducer {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Enqueue `payload` for `entrypoint` at [`DEFAULT_PRIORITY`].
    ///
    /// Returns the job ID once the job is durably stored. The entrypoint is
    /// not checked against any registry; an unknown name fails when claimed.
    pub async fn enqueue<P: Serialize>(
        &self,
        entrypoint: &str,
        payload: &P,
    ) -> Result<DbId, ProducerError> {
        self.enqueue_with_priority(entrypoint, payload, DEFAULT_PRIORITY)
            .await
    }

    pub async fn enqueue_with_priority<P: Serialize>(
        &self,
        entrypoint: &str,
        payload: &P,
        priority: i32,
    ) -> Result<DbId, ProducerError> {
        let bytes = serde_json::to_vec(payload)?;
        let job = JobRepo::enqueue(
            &self.pool,
            &NewJob {
                entrypoint,
                payload: &bytes,
                priority,
            },
        )
        .await?;

        tracing::info!(job_id = job.id, entrypoint, priority, "Job enqueued");
        Ok(job.id)
    }

    /// Request a visitor prediction for a newly created museum.
    pub async fn museum_created(
        &self,
        museum_id: EntityId,
        city: &str,
    ) -> Result<DbId, ProducerError> {
        self.enqueue(LOG_MUSEUM_CREATED, &MuseumCreated::new(museum_id, city))
            .await
    }
}
