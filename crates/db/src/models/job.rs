//! Job entity models for the durable queue.

use serde::Serialize;
use sqlx::FromRow;
use museo_core::types::{DbId, Timestamp};
use uuid::Uuid;

use super::status::{JobStatus, StatusId};

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub entrypoint: String,
    pub payload: Vec<u8>,
    pub priority: i32,
    pub status_id: StatusId,
    pub retry_count: i32,
    pub lock_token: Option<Uuid>,
    pub locked_at: Option<Timestamp>,
    pub heartbeat_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// Typed status; `None` only if the lookup table holds an unknown ID.
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::from_id(self.status_id)
    }
}

/// Input for [`JobRepo::enqueue`](crate::repositories::JobRepo::enqueue).
#[derive(Debug, Clone, Copy)]
pub struct NewJob<'a> {
    pub entrypoint: &'a str,
    pub payload: &'a [u8],
    /// Lower sorts first.
    pub priority: i32,
}
