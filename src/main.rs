use anyhow::{Context, Result};
use mirror_sync::api::{AppState, create_router};
use mirror_sync::config::SyncConfig;
use mirror_sync::logging::{self, LogConfig};
use mirror_sync::scheduler::{Scheduler, SchedulerConfig, SchedulerContext};
use mirror_sync::store::StoreDb;
use mirror_sync::transfer::RsyncExecutor;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<()> {
    let config = SyncConfig::from_env().context("Invalid configuration")?;

    // Keep the guard alive for the entire application lifetime
    let _log_guard = logging::init_logging(LogConfig {
        log_dir: config.log_dir.clone(),
        max_files: config.log_max_files,
        default_level: config.log_level.clone(),
        ..LogConfig::default()
    })
    .context("Failed to initialize logging system")?;

    tracing::info!(
        target: "main",
        database = %config.database_path.display(),
        schedule = %config.schedule,
        "Starting mirror sync service"
    );
    tracing::debug!(target: "config", ?config, "Loaded configuration");

    let db = StoreDb::open(&config.database_path, config.db_pool_size)
        .context("Failed to open mirror database")?;
    let ctx = Arc::new(SchedulerContext::new());
    let executor = RsyncExecutor::new(&config.rsync_binary).with_max_runtime(config.max_runtime);

    // Health endpoint
    let app = create_router(AppState { ctx: ctx.clone() }).layer(TraceLayer::new_for_http());
    let listener = tokio::net::TcpListener::bind(config.health_addr)
        .await
        .context(format!("Failed to bind to {}", config.health_addr))?;
    tracing::info!(target: "main", "Health check available at http://{}/health", config.health_addr);

    let server_ctx = ctx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_ctx.cancellation().cancelled().await })
            .await
    });

    tokio::spawn(shutdown_signal(ctx.clone()));

    let scheduler = Scheduler::new(db, executor, ctx.clone(), SchedulerConfig::from_sync_config(&config));
    let outcome = scheduler.run().await;

    // Stop the health server whichever way the scheduler ended
    ctx.shutdown();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(target: "main", error = %e, "Health server error"),
        Err(e) => tracing::error!(target: "main", error = %e, "Health server task failed"),
    }

    outcome.context("Scheduler failed to start")?;
    tracing::info!(target: "main", "Shutdown complete");

    Ok(())
}

/// Wait for SIGINT or SIGTERM, then stop the scheduler and any transfer
async fn shutdown_signal(ctx: Arc<SchedulerContext>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(target: "main", error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(target: "main", error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!(target: "main", "Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!(target: "main", "Received SIGTERM signal");
        },
    }

    tracing::info!(target: "main", "Shutting down gracefully...");
    ctx.shutdown();
}
