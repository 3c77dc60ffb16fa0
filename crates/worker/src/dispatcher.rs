//! Background job dispatcher.
//!
//! Claims queued jobs with [`JobRepo::claim_next`] (`FOR UPDATE SKIP
//! LOCKED`), so any number of dispatchers can share one queue without
//! double-dispatch. Each claimed job runs on its own task; at most
//! `concurrency` run at once per dispatcher. The loop wakes on a poll
//! interval and, when available, on `NOTIFY` from the producer.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use museo_core::backoff::{Backoff, BackoffConfig};
use museo_core::outcome::Outcome;
use museo_db::models::job::Job;
use museo_db::models::status::JobStatus;
use museo_db::repositories::{JobRepo, JOB_NOTIFY_CHANNEL};
use museo_db::DbPool;
use sqlx::postgres::PgListener;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::context::{JobContext, WorkerContext};
use crate::error::HandlerError;
use crate::registry::{EntrypointRegistry, JobHandler};

/// After the grace period, how long cancelled handlers get to notice before
/// their tasks are aborted.
const ABORT_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub concurrency: usize,
    pub poll_interval: Duration,
    /// Delay growth while claiming or recording an outcome keeps failing.
    pub backoff: BackoffConfig,
    pub visibility_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub shutdown_grace: Duration,
    /// Subscribe to enqueue notifications in addition to polling.
    pub listen: bool,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_secs(1),
            backoff: BackoffConfig {
                initial_delay: Duration::from_secs(1),
                ..BackoffConfig::default()
            },
            visibility_timeout: Duration::from_secs(300),
            heartbeat_interval: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(30),
            listen: true,
        }
    }
}

/// What happened to in-flight jobs when the dispatcher stopped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Jobs that finished within the grace period.
    pub drained: usize,
    /// Jobs still running at the deadline. They stay in `processing` and are
    /// recovered by another consumer after the visibility timeout.
    pub abandoned: usize,
}

pub struct JobDispatcher {
    ctx: Arc<WorkerContext>,
    registry: Arc<EntrypointRegistry>,
    settings: DispatcherSettings,
}

impl JobDispatcher {
    pub fn new(
        ctx: Arc<WorkerContext>,
        registry: Arc<EntrypointRegistry>,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            ctx,
            registry,
            settings,
        }
    }

    /// Run the dispatcher loop until `shutdown` is triggered, then drain.
    ///
    /// No new jobs are claimed after `shutdown` fires. In-flight handlers get
    /// `shutdown_grace` to finish; the rest are cancelled and left for
    /// recovery.
    pub async fn run(&self, shutdown: CancellationToken) -> DrainReport {
        let concurrency = self.settings.concurrency.max(1);
        let abort = CancellationToken::new();
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut listener = self.listen().await;
        let mut backoff = Backoff::new(self.settings.backoff.clone());

        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            concurrency,
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            entrypoints = ?self.registry.names(),
            "Job dispatcher started",
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    log_join_result(result);
                }
                _ = next_notification(&mut listener) => {}
                _ = ticker.tick() => {}
            }

            let capacity = concurrency.saturating_sub(tasks.len());
            if capacity == 0 {
                continue;
            }

            match self.claim_and_spawn(capacity, &mut tasks, &abort).await {
                Ok(_) => backoff.reset(),
                Err(e) => {
                    let delay = backoff.fail();
                    tracing::error!(
                        error = %e,
                        failures = backoff.failures(),
                        retry_in_ms = delay.as_millis() as u64,
                        "Dispatch cycle failed",
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.drain(tasks, abort).await
    }

    /// One dispatch cycle: claim up to `capacity` jobs and start them.
    async fn claim_and_spawn(
        &self,
        capacity: usize,
        tasks: &mut JoinSet<()>,
        abort: &CancellationToken,
    ) -> Result<usize, sqlx::Error> {
        let pool = &self.ctx.pool;
        let lock_token = Uuid::new_v4();
        let jobs = JobRepo::claim_next(
            pool,
            capacity as i64,
            lock_token,
            self.settings.visibility_timeout,
        )
        .await?;
        let claimed = jobs.len();

        for job in jobs {
            if job.retry_count > 0 {
                tracing::warn!(
                    job_id = job.id,
                    retry_count = job.retry_count,
                    "Recovered job from an unresponsive consumer",
                );
            }

            let Some(handler) = self.registry.get(&job.entrypoint) else {
                fail_unregistered(pool, &job, lock_token).await;
                continue;
            };

            match JobRepo::mark_processing(pool, job.id, lock_token).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(job_id = job.id, "Lost claim before dispatch");
                    continue;
                }
                Err(e) => {
                    tracing::error!(job_id = job.id, error = %e, "Failed to mark job processing");
                    continue;
                }
            }

            tracing::info!(
                job_id = job.id,
                entrypoint = %job.entrypoint,
                priority = job.priority,
                "Job claimed",
            );

            let ctx = JobContext::new(
                job.id,
                job.entrypoint,
                job.retry_count,
                Arc::clone(&self.ctx),
                abort.child_token(),
            );
            tasks.spawn(execute(
                pool.clone(),
                handler,
                ctx,
                job.payload,
                lock_token,
                self.timings(),
            ));
        }

        Ok(claimed)
    }

    fn timings(&self) -> JobTimings {
        JobTimings {
            heartbeat_interval: self.settings.heartbeat_interval,
            record_deadline: self.settings.visibility_timeout,
            record_backoff: self
                .settings
                .backoff
                .capped_at(self.settings.heartbeat_interval),
        }
    }

    async fn listen(&self) -> Option<PgListener> {
        if !self.settings.listen {
            return None;
        }

        let result = async {
            let mut listener = PgListener::connect_with(&self.ctx.pool).await?;
            listener.listen(JOB_NOTIFY_CHANNEL).await?;
            Ok::<_, sqlx::Error>(listener)
        }
        .await;

        match result {
            Ok(listener) => {
                tracing::debug!(channel = JOB_NOTIFY_CHANNEL, "Listening for enqueued jobs");
                Some(listener)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Job notifications unavailable, polling only");
                None
            }
        }
    }

    async fn drain(&self, mut tasks: JoinSet<()>, abort: CancellationToken) -> DrainReport {
        let mut report = DrainReport::default();
        tracing::info!(
            in_flight = tasks.len(),
            grace_secs = self.settings.shutdown_grace.as_secs_f64(),
            "Job dispatcher draining",
        );

        let finished = tokio::time::timeout(self.settings.shutdown_grace, async {
            while let Some(result) = tasks.join_next().await {
                log_join_result(result);
                report.drained += 1;
            }
        })
        .await;

        if finished.is_err() {
            report.abandoned = tasks.len();
            tracing::warn!(
                abandoned = report.abandoned,
                "Grace period elapsed, cancelling in-flight jobs",
            );
            abort.cancel();

            let _ = tokio::time::timeout(ABORT_WINDOW, async {
                while let Some(result) = tasks.join_next().await {
                    log_join_result(result);
                }
            })
            .await;
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        tracing::info!(
            drained = report.drained,
            abandoned = report.abandoned,
            "Job dispatcher stopped",
        );
        report
    }
}

/// Per-job timing derived from [`DispatcherSettings`].
#[derive(Debug, Clone)]
struct JobTimings {
    heartbeat_interval: Duration,
    /// How long to keep retrying a failed outcome write.
    record_deadline: Duration,
    /// Retry delays for outcome writes, capped at the heartbeat interval so
    /// the claim stays fresh while retrying.
    record_backoff: BackoffConfig,
}

/// Run one handler invocation and record its outcome.
///
/// The job's heartbeat is refreshed every `heartbeat_interval` while the
/// handler runs. A panic is caught and recorded as a failure.
async fn execute(
    pool: DbPool,
    handler: Arc<dyn JobHandler>,
    ctx: JobContext,
    payload: Vec<u8>,
    lock_token: Uuid,
    timings: JobTimings,
) {
    let job_id = ctx.job_id;
    let span = tracing::info_span!("job", job_id, entrypoint = %ctx.entrypoint);

    async move {
        let started = Instant::now();
        let result = {
            let work = AssertUnwindSafe(handler.handle(&ctx, &payload)).catch_unwind();
            tokio::pin!(work);

            let mut heartbeat = tokio::time::interval_at(
                tokio::time::Instant::now() + timings.heartbeat_interval,
                timings.heartbeat_interval,
            );
            heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    result = &mut work => break result,
                    _ = heartbeat.tick() => {
                        beat(&pool, job_id, lock_token).await;
                    }
                }
            }
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(HandlerError::Cancelled)) => {
                tracing::warn!(elapsed_ms, "Job cancelled, left for recovery");
                return;
            }
            Ok(Err(e)) => Outcome::failure(e.to_string()),
            Err(panic) => Outcome::failure(format!(
                "Handler panicked: {}",
                panic_message(&*panic)
            )),
        };

        match &outcome {
            Outcome::Success => tracing::info!(elapsed_ms, "Job succeeded"),
            Outcome::Failure { reason } => {
                tracing::warn!(elapsed_ms, reason = %reason, "Job failed")
            }
        }

        record_outcome(&pool, &ctx, lock_token, &outcome, &timings).await;
    }
    .instrument(span)
    .await
}

/// Write `outcome`, retrying store errors with backoff.
///
/// The handler's side effects are already committed, so giving up early
/// would let the job be recovered and run twice. Between attempts the
/// heartbeat is refreshed to keep the claim. Stops once the outcome is
/// stored, the claim is lost, `record_deadline` passes, or the job is
/// cancelled by shutdown.
async fn record_outcome(
    pool: &DbPool,
    ctx: &JobContext,
    lock_token: Uuid,
    outcome: &Outcome,
    timings: &JobTimings,
) {
    let job_id = ctx.job_id;
    let deadline = Instant::now() + timings.record_deadline;
    let mut backoff = Backoff::new(timings.record_backoff.clone());

    loop {
        match JobRepo::mark_result(pool, job_id, lock_token, outcome).await {
            Ok(true) => {
                if backoff.failures() > 0 {
                    tracing::info!(attempts = backoff.failures() + 1, "Job outcome recorded");
                }
                return;
            }
            Ok(false) if backoff.failures() > 0 => {
                // An earlier attempt may have committed before its error surfaced.
                if recorded_under(pool, job_id, lock_token).await {
                    tracing::info!("Job outcome recorded by an earlier attempt");
                } else {
                    tracing::warn!("Outcome not recorded, claim is no longer held");
                }
                return;
            }
            Ok(false) => {
                tracing::warn!("Outcome not recorded, claim is no longer held");
                return;
            }
            Err(e) => {
                let delay = backoff.fail();
                if Instant::now() + delay >= deadline {
                    tracing::error!(
                        error = %e,
                        attempts = backoff.failures(),
                        "Giving up on recording job outcome",
                    );
                    return;
                }
                tracing::warn!(
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Failed to record job outcome, retrying",
                );

                if !beat(pool, job_id, lock_token).await {
                    return;
                }
                tokio::select! {
                    _ = ctx.cancelled() => {
                        tracing::warn!("Job cancelled before its outcome was recorded");
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

/// Whether the job reached a terminal status under `lock_token`.
async fn recorded_under(pool: &DbPool, job_id: i64, lock_token: Uuid) -> bool {
    match JobRepo::find_by_id(pool, job_id).await {
        Ok(Some(job)) => {
            job.lock_token == Some(lock_token) && job.status().is_some_and(JobStatus::is_terminal)
        }
        Ok(None) => false,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read back job status");
            false
        }
    }
}

/// Refresh the heartbeat. Returns `false` once the claim is known to be lost.
async fn beat(pool: &DbPool, job_id: i64, lock_token: Uuid) -> bool {
    match JobRepo::heartbeat(pool, job_id, lock_token).await {
        Ok(true) => {
            tracing::trace!("Heartbeat");
            true
        }
        Ok(false) => {
            tracing::warn!("Heartbeat rejected, claim is no longer held");
            false
        }
        Err(e) => {
            tracing::warn!(error = %e, "Heartbeat failed");
            true
        }
    }
}

/// Fail a claimed job whose entrypoint has no handler, without running
/// anything.
async fn fail_unregistered(pool: &DbPool, job: &Job, lock_token: Uuid) {
    let outcome = Outcome::failure(format!("Unregistered entrypoint '{}'", job.entrypoint));
    tracing::warn!(
        job_id = job.id,
        entrypoint = %job.entrypoint,
        "No handler for entrypoint, failing job",
    );
    if let Err(e) = JobRepo::mark_result(pool, job.id, lock_token, &outcome).await {
        tracing::error!(job_id = job.id, error = %e, "Failed to record job outcome");
    }
}

/// Wait for the next enqueue notification. Never resolves without a
/// listener; a broken listener is dropped and the loop falls back to polling.
async fn next_notification(listener: &mut Option<PgListener>) {
    let Some(active) = listener.as_mut() else {
        return std::future::pending().await;
    };

    match active.recv().await {
        Ok(notification) => {
            tracing::trace!(job_id = notification.payload(), "Job enqueued notification");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Job listener failed, polling only");
            *listener = None;
        }
    }
}

fn log_join_result(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            tracing::error!(error = %e, "Job task panicked");
        } else {
            tracing::debug!(error = %e, "Job task aborted");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
