//! Schema provisioning for the job queue and the entity tables.
//!
//! [`install`] creates the baseline queue tables and is safe to race from
//! several processes on first boot. [`upgrade`] installs and then applies the
//! versioned migrations under `migrations/`. Both are idempotent and meant to
//! be called on every startup.

use sqlx::migrate::{MigrateError, Migrator};
use sqlx::PgPool;

use crate::models::status::{JobStatus, StatusId};

/// Versioned revisions applied on top of the baseline by [`upgrade`].
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Advisory lock key serializing concurrent [`install`] calls.
const INSTALL_LOCK_KEY: i64 = 0x6d75_7365_6f71;

/// Postgres error codes that mean another process provisioned the object
/// first: unique_violation (catalog race), duplicate_schema,
/// duplicate_table, duplicate_object.
const ALREADY_EXISTS_CODES: [&str; 4] = ["23505", "42P06", "42P07", "42710"];

/// Baseline DDL. Every statement must be idempotent on its own.
const INSTALL_STATEMENTS: [&str; 2] = [
    "CREATE TABLE IF NOT EXISTS job_statuses ( \
         id SMALLINT PRIMARY KEY, \
         name TEXT NOT NULL UNIQUE, \
         created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(), \
         updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW() \
     )",
    "CREATE TABLE IF NOT EXISTS jobs ( \
         id BIGSERIAL PRIMARY KEY, \
         entrypoint TEXT NOT NULL, \
         payload BYTEA NOT NULL, \
         priority INTEGER NOT NULL DEFAULT 0, \
         status_id SMALLINT NOT NULL DEFAULT 1 REFERENCES job_statuses (id), \
         retry_count INTEGER NOT NULL DEFAULT 0, \
         lock_token UUID, \
         locked_at TIMESTAMPTZ, \
         heartbeat_at TIMESTAMPTZ, \
         completed_at TIMESTAMPTZ, \
         error_message TEXT, \
         created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(), \
         updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW() \
     )",
];

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] MigrateError),
}

/// Provision the baseline queue schema.
///
/// Runs in one transaction holding an advisory lock, so concurrent callers
/// serialize instead of colliding. An "already exists" error from a caller
/// that bypassed the lock is treated as success.
pub async fn install(pool: &PgPool) -> Result<(), SchemaError> {
    match install_inner(pool).await {
        Ok(()) => {
            tracing::info!("Job queue schema installed");
            Ok(())
        }
        Err(e) if is_already_exists(&e) => {
            tracing::info!(error = %e, "Job queue schema already provisioned");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn install_inner(pool: &PgPool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(INSTALL_LOCK_KEY)
        .execute(&mut *tx)
        .await?;

    for statement in INSTALL_STATEMENTS {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    for status in JobStatus::ALL {
        sqlx::query(
            "INSERT INTO job_statuses (id, name) VALUES ($1, $2) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(status.id())
        .bind(status.name())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Bring the schema to the latest revision.
///
/// Calls [`install`] first, then applies pending migrations. The migrator
/// takes its own advisory lock and records applied versions, so repeated
/// calls are no-ops.
pub async fn upgrade(pool: &PgPool) -> Result<(), SchemaError> {
    install(pool).await?;
    MIGRATOR.run(pool).await?;
    tracing::info!(
        revisions = MIGRATOR.iter().count(),
        "Schema upgraded to latest revision"
    );
    Ok(())
}

/// Seeded status rows, for schema verification.
pub async fn seeded_statuses(pool: &PgPool) -> Result<Vec<(StatusId, String)>, sqlx::Error> {
    sqlx::query_as("SELECT id, name FROM job_statuses ORDER BY id")
        .fetch_all(pool)
        .await
}

fn is_already_exists(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| ALREADY_EXISTS_CODES.iter().any(|known| code == *known)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_are_not_already_exists() {
        assert!(!is_already_exists(&sqlx::Error::RowNotFound));
        assert!(!is_already_exists(&sqlx::Error::PoolTimedOut));
    }

    #[test]
    fn every_install_statement_is_idempotent() {
        for statement in INSTALL_STATEMENTS {
            assert!(
                statement.contains("IF NOT EXISTS"),
                "statement is not idempotent: {statement}"
            );
        }
    }
}
