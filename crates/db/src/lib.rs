//! Postgres access for the job queue and the museum entity tables.
//!
//! Exposes pool construction, readiness checks, schema provisioning
//! ([`schema::install`] / [`schema::upgrade`]) and zero-sized repositories.

use std::time::{Duration, Instant};

use sqlx::postgres::PgPoolOptions;

pub mod models;
pub mod repositories;
pub mod schema;

pub type DbPool = sqlx::PgPool;

/// Delay between readiness probes in [`wait_for_db`].
const WAIT_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Create a connection pool from a database URL.
///
/// Connections are opened lazily, so this only fails on a malformed URL.
/// Call [`wait_for_db`] to block until the server is reachable.
pub fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect_lazy(database_url)
}

/// Run a trivial query to verify the database answers.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Retry [`health_check`] until it succeeds or `timeout` elapses.
///
/// Returns the last error once the timeout is exceeded.
pub async fn wait_for_db(pool: &DbPool, timeout: Duration) -> Result<(), sqlx::Error> {
    let started = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match health_check(pool).await {
            Ok(()) => {
                tracing::debug!(attempt, "Database is ready");
                return Ok(());
            }
            Err(e) if started.elapsed() >= timeout => {
                tracing::error!(
                    attempt,
                    timeout_secs = timeout.as_secs(),
                    error = %e,
                    "Database wait timed out",
                );
                return Err(e);
            }
            Err(e) => {
                tracing::debug!(attempt, error = %e, "Database not ready yet");
                tokio::time::sleep(WAIT_RETRY_INTERVAL).await;
            }
        }
    }
}
