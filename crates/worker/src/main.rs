use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use museo_inference::InferenceEngine;
use museo_worker::config::{LogFormat, WorkerConfig};
use museo_worker::shutdown::ShutdownSignals;
use museo_worker::{handlers, JobDispatcher, WorkerContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = WorkerConfig::from_env()?;
    init_tracing(config.log_format);
    tracing::info!(
        concurrency = config.concurrency,
        model_path = %config.model_path.display(),
        "Loaded worker configuration",
    );

    // --- Database ---
    let pool = museo_db::create_pool(&config.database_url, config.db_max_connections)?;
    museo_db::wait_for_db(&pool, config.db_wait_timeout).await?;
    tracing::info!("Database health check passed");

    museo_db::schema::upgrade(&pool).await?;

    // --- Inference ---
    let inference = InferenceEngine::load(&config.model_path);

    // --- Dispatcher ---
    let ctx = Arc::new(WorkerContext::new(pool.clone(), inference));
    let registry = Arc::new(handlers::default_registry()?);
    let dispatcher = JobDispatcher::new(ctx, registry, config.dispatcher_settings());

    let signals = ShutdownSignals::install()?;
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match signals.recv().await {
            Ok(signal) => {
                tracing::info!(signal, "Shutdown signal received");
                signal_token.cancel();
            }
            // Keep serving; the process can still be stopped externally.
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signals"),
        }
    });

    let report = dispatcher.run(shutdown).await;

    pool.close().await;
    tracing::info!(
        drained = report.drained,
        abandoned = report.abandoned,
        "Graceful shutdown complete",
    );
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "museo_worker=info,museo_db=info,museo_inference=info".into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}
