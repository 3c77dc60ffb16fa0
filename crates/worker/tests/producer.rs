//! Integration tests for the enqueue side.

mod common;

use museo_core::entrypoints::LOG_MUSEUM_CREATED;
use museo_core::payload::MuseumCreated;
use museo_db::models::status::JobStatus;
use museo_db::repositories::JobRepo;
use museo_inference::InferenceEngine;
use serde::Serialize;
use sqlx::PgPool;

#[derive(Serialize)]
struct Ping {
    n: u32,
}

#[sqlx::test(migrations = false)]
async fn museum_created_stores_decodable_payload(pool: PgPool) {
    common::setup(&pool).await;
    let ctx = common::context(&pool, InferenceEngine::unavailable());
    let museum_id = uuid::Uuid::now_v7();

    let job_id = ctx.producer().museum_created(museum_id, "Lisbon").await.unwrap();

    let job = JobRepo::find_by_id(&pool, job_id).await.unwrap().unwrap();
    assert_eq!(job.entrypoint, LOG_MUSEUM_CREATED);
    assert_eq!(job.status(), Some(JobStatus::Queued));
    assert_eq!(job.priority, 0);

    let payload = MuseumCreated::decode(&job.payload).unwrap();
    assert_eq!(payload.museum_uuid().unwrap(), museum_id);
    assert_eq!(payload.city, "Lisbon");
}

#[sqlx::test(migrations = false)]
async fn duplicate_payloads_are_separate_jobs(pool: PgPool) {
    common::setup(&pool).await;
    let producer = common::context(&pool, InferenceEngine::unavailable()).producer();

    let first = producer.enqueue("ping", &Ping { n: 1 }).await.unwrap();
    let second = producer.enqueue("ping", &Ping { n: 1 }).await.unwrap();

    assert_ne!(first, second);
    assert_eq!(
        JobRepo::count_by_status(&pool, JobStatus::Queued).await.unwrap(),
        2
    );
}

#[sqlx::test(migrations = false)]
async fn unknown_entrypoint_is_accepted_at_enqueue(pool: PgPool) {
    common::setup(&pool).await;
    let producer = common::context(&pool, InferenceEngine::unavailable()).producer();

    let job_id = producer
        .enqueue_with_priority("nobody_handles_this", &Ping { n: 7 }, -5)
        .await
        .unwrap();

    let job = JobRepo::find_by_id(&pool, job_id).await.unwrap().unwrap();
    assert_eq!(job.priority, -5);
    assert_eq!(job.payload, br#"{"n":7}"#.to_vec());
}
