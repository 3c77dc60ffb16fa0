//! Integration tests for queue schema provisioning.

use museo_db::models::status::JobStatus;
use museo_db::schema;
use sqlx::PgPool;

#[sqlx::test(migrations = false)]
async fn install_twice_is_a_no_op(pool: PgPool) {
    schema::install(&pool).await.unwrap();
    schema::install(&pool).await.unwrap();

    let statuses = schema::seeded_statuses(&pool).await.unwrap();
    assert_eq!(statuses.len(), JobStatus::ALL.len());
    for (status, (id, name)) in JobStatus::ALL.iter().zip(&statuses) {
        assert_eq!(status.id(), *id);
        assert_eq!(status.name(), name.as_str());
    }
}

#[sqlx::test(migrations = false)]
async fn concurrent_installs_all_succeed(pool: PgPool) {
    let results = futures::future::join_all((0..4).map(|_| schema::install(&pool))).await;

    for result in results {
        result.unwrap();
    }
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_statuses")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, JobStatus::ALL.len() as i64);
}

#[sqlx::test(migrations = false)]
async fn upgrade_is_idempotent_and_creates_entity_tables(pool: PgPool) {
    schema::upgrade(&pool).await.unwrap();
    schema::upgrade(&pool).await.unwrap();

    for table in ["jobs", "job_statuses", "city", "museum", "visitor_prediction"] {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS ( \
                 SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = 'public' AND table_name = $1 \
             )",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(exists, "table {table} should exist after upgrade");
    }
}

#[sqlx::test(migrations = false)]
async fn install_after_upgrade_keeps_store_usable(pool: PgPool) {
    schema::upgrade(&pool).await.unwrap();
    schema::install(&pool).await.unwrap();

    museo_db::health_check(&pool).await.unwrap();
    let queued = museo_db::repositories::JobRepo::count_by_status(&pool, JobStatus::Queued)
        .await
        .unwrap();
    assert_eq!(queued, 0);
}

#[sqlx::test(migrations = false)]
async fn payload_cannot_be_rewritten(pool: PgPool) {
    schema::upgrade(&pool).await.unwrap();
    let job = museo_db::repositories::JobRepo::enqueue(
        &pool,
        &museo_db::models::job::NewJob {
            entrypoint: "noop",
            payload: b"{}",
            priority: 0,
        },
    )
    .await
    .unwrap();

    let result = sqlx::query("UPDATE jobs SET payload = $2 WHERE id = $1")
        .bind(job.id)
        .bind(b"{\"changed\":true}".as_slice())
        .execute(&pool)
        .await;
    assert!(result.is_err(), "payload update must be rejected");
}
