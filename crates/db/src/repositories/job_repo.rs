//! Repository for the `jobs` table.
//!
//! Every status transition after the claim is conditional on the claim's
//! `lock_token`, so a consumer whose job was recovered by another consumer
//! after a visibility timeout can no longer change it.

use std::time::Duration;

use museo_core::outcome::Outcome;
use museo_core::types::DbId;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::job::{Job, NewJob};
use crate::models::status::JobStatus;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, entrypoint, payload, priority, status_id, retry_count, \
    lock_token, locked_at, heartbeat_at, completed_at, error_message, \
    created_at, updated_at";

/// Channel notified after every enqueue. The payload is the job ID.
pub const JOB_NOTIFY_CHANNEL: &str = "museo_jobs";

/// Provides queue operations for jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new job in `queued` state and notify listening dispatchers.
    ///
    /// Returns once the row is committed. Duplicate payloads are allowed and
    /// processed independently.
    pub async fn enqueue(pool: &PgPool, input: &NewJob<'_>) -> Result<Job, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO jobs (entrypoint, payload, priority, status_id) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        let job = sqlx::query_as::<_, Job>(&query)
            .bind(input.entrypoint)
            .bind(input.payload)
            .bind(input.priority)
            .bind(JobStatus::Queued.id())
            .fetch_one(&mut *tx)
            .await?;

        // Delivered on commit.
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(JOB_NOTIFY_CHANNEL)
            .bind(job.id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(job)
    }

    /// Atomically claim up to `limit` jobs for one consumer.
    ///
    /// Picks `queued` jobs, plus `locked`/`processing` jobs whose heartbeat is
    /// older than `visibility_timeout` (their consumer is presumed dead; the
    /// recovered job's `retry_count` is incremented). Candidates are ordered by
    /// `(priority ASC, created_at ASC)` and locked with
    /// `FOR UPDATE SKIP LOCKED`, so concurrent consumers never receive the
    /// same job. Claimed jobs move to `locked` and carry `lock_token`.
    pub async fn claim_next(
        pool: &PgPool,
        limit: i64,
        lock_token: Uuid,
        visibility_timeout: Duration,
    ) -> Result<Vec<Job>, sqlx::Error> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let returning = COLUMNS
            .split(", ")
            .map(|column| format!("j.{}", column.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!(
            "WITH next AS ( \
                 SELECT id FROM jobs \
                 WHERE status_id = $1 \
                    OR (status_id IN ($2, $3) \
                        AND heartbeat_at < NOW() - make_interval(secs => $4)) \
                 ORDER BY priority ASC, created_at ASC, id ASC \
                 LIMIT $5 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             UPDATE jobs j \
             SET status_id = $2, \
                 lock_token = $6, \
                 locked_at = NOW(), \
                 heartbeat_at = NOW(), \
                 updated_at = NOW(), \
                 retry_count = j.retry_count + CASE WHEN j.status_id = $1 THEN 0 ELSE 1 END \
             FROM next \
             WHERE j.id = next.id \
             RETURNING {returning}"
        );
        let mut jobs = sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Queued.id())
            .bind(JobStatus::Locked.id())
            .bind(JobStatus::Processing.id())
            .bind(visibility_timeout.as_secs_f64())
            .bind(limit)
            .bind(lock_token)
            .fetch_all(pool)
            .await?;

        // RETURNING does not preserve the CTE's order.
        jobs.sort_by(|a, b| {
            (a.priority, a.created_at, a.id).cmp(&(b.priority, b.created_at, b.id))
        });
        Ok(jobs)
    }

    /// Move a claimed job from `locked` to `processing`.
    ///
    /// Returns `false` if the job is no longer held under `lock_token`.
    pub async fn mark_processing(
        pool: &PgPool,
        job_id: DbId,
        lock_token: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $3, heartbeat_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND lock_token = $2 AND status_id = $4",
        )
        .bind(job_id)
        .bind(lock_token)
        .bind(JobStatus::Processing.id())
        .bind(JobStatus::Locked.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Refresh the heartbeat of an in-flight job.
    ///
    /// Returns `false` if the job is no longer held under `lock_token`.
    pub async fn heartbeat(
        pool: &PgPool,
        job_id: DbId,
        lock_token: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET heartbeat_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND lock_token = $2 AND status_id IN ($3, $4)",
        )
        .bind(job_id)
        .bind(lock_token)
        .bind(JobStatus::Locked.id())
        .bind(JobStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a handler outcome: `successful` or `failed` with its reason.
    ///
    /// Accepted from `locked` (a job failed before dispatch, e.g. unknown
    /// entrypoint) or `processing`. A second call for the same claim is a
    /// no-op and returns `false`, as does a call with a stale `lock_token`.
    pub async fn mark_result(
        pool: &PgPool,
        job_id: DbId,
        lock_token: Uuid,
        outcome: &Outcome,
    ) -> Result<bool, sqlx::Error> {
        let status = if outcome.is_success() {
            JobStatus::Successful
        } else {
            JobStatus::Failed
        };

        let result = sqlx::query(
            "UPDATE jobs \
             SET status_id = $3, error_message = $4, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND lock_token = $2 AND status_id IN ($5, $6)",
        )
        .bind(job_id)
        .bind(lock_token)
        .bind(status.id())
        .bind(outcome.reason())
        .bind(JobStatus::Locked.id())
        .bind(JobStatus::Processing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Count jobs currently in `status`.
    pub async fn count_by_status(pool: &PgPool, status: JobStatus) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status_id = $1")
            .bind(status.id())
            .fetch_one(pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_list_has_no_blank_entries() {
        assert!(COLUMNS.split(", ").all(|c| !c.trim().is_empty()));
    }
}
