//! Shared fixtures for the worker integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use museo_core::backoff::BackoffConfig;
use museo_core::types::{DbId, EntityId};
use museo_db::models::job::Job;
use museo_db::models::museum::CreateMuseum;
use museo_db::models::status::JobStatus;
use museo_db::repositories::{JobRepo, MuseumRepo};
use museo_db::schema;
use museo_inference::{InferenceEngine, InferenceError, Predictor};
use museo_worker::{DispatcherSettings, DrainReport, EntrypointRegistry, JobDispatcher, WorkerContext};
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Predictor returning the same raw output for every population.
pub struct Fixed(pub f64);

impl Predictor for Fixed {
    fn predict_raw(&self, _population: i64) -> Result<f64, InferenceError> {
        Ok(self.0)
    }
}

pub async fn setup(pool: &PgPool) {
    schema::upgrade(pool).await.unwrap();
}

pub fn engine(output: f64) -> InferenceEngine {
    InferenceEngine::from_predictor(Arc::new(Fixed(output)))
}

pub fn context(pool: &PgPool, inference: InferenceEngine) -> Arc<WorkerContext> {
    Arc::new(WorkerContext::new(pool.clone(), inference))
}

/// Fast-polling settings so tests do not wait on the default one second.
pub fn settings(concurrency: usize) -> DispatcherSettings {
    DispatcherSettings {
        concurrency,
        poll_interval: Duration::from_millis(50),
        backoff: BackoffConfig {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
        },
        visibility_timeout: Duration::from_secs(300),
        heartbeat_interval: Duration::from_secs(30),
        shutdown_grace: Duration::from_secs(5),
        listen: true,
    }
}

pub async fn create_museum(pool: &PgPool, city: &str, population: i64) -> EntityId {
    MuseumRepo::create(
        pool,
        &CreateMuseum {
            city: city.to_string(),
            population,
        },
    )
    .await
    .unwrap()
    .id
}

/// A dispatcher running on a background task.
pub struct Running {
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<DrainReport>,
}

impl Running {
    pub async fn stop(self) -> DrainReport {
        self.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(15), self.handle)
            .await
            .expect("dispatcher did not stop")
            .unwrap()
    }
}

pub fn spawn_dispatcher(
    ctx: Arc<WorkerContext>,
    registry: EntrypointRegistry,
    settings: DispatcherSettings,
) -> Running {
    let dispatcher = JobDispatcher::new(ctx, Arc::new(registry), settings);
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let handle = tokio::spawn(async move { dispatcher.run(token).await });
    Running { shutdown, handle }
}

/// Poll until the job reaches `status`, panicking after ten seconds.
pub async fn wait_for_status(pool: &PgPool, job_id: DbId, status: JobStatus) -> Job {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let job = JobRepo::find_by_id(pool, job_id).await.unwrap().unwrap();
        if job.status() == Some(status) {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {job_id} stuck in {:?}, expected {status:?}",
            job.status()
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

pub async fn count(pool: &PgPool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}
