//! # lumend — lumen daemon
//!
//! Composition root that wires the adapters around the orchestrator and
//! starts the server.
//!
//! ## Responsibilities
//! - Load configuration (`lumen.toml` plus environment overrides)
//! - Initialise `tracing` with the configured filter
//! - Open the `SQLite` pool, run migrations, build the snapshot store
//! - Build the orchestrator over the virtual controller, then restore the
//!   persisted snapshot and run an initial sync
//! - Build the axum router and serve it
//! - Persist the snapshot and stop background tasks on SIGINT/SIGTERM
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use lumen_adapter_http_axum::state::AppState;
use lumen_adapter_storage_sqlite_sqlx::SqliteSnapshotStore;
use lumen_adapter_virtual::VirtualController;
use lumen_app::orchestrator::Orchestrator;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    // Database
    let db = lumen_adapter_storage_sqlite_sqlx::Config {
        database_url: config.database_url().to_string(),
    }
    .build()
    .await?;
    let store = SqliteSnapshotStore::new(
        db.pool().clone(),
        config.orchestrator.installation_id.clone(),
    );

    // Controller
    if config.zones.is_empty() {
        tracing::warn!("no zones configured, nothing will be driven");
    }
    let controller = VirtualController::new().with_lights(
        config
            .zones
            .iter()
            .flat_map(|zone| zone.lights.iter().cloned()),
    );

    // Orchestrator
    let orchestrator = Orchestrator::builder(controller, store)
        .zones(config.zones.clone())
        .settings(config.orchestrator_settings())
        .timer_settings(config.timer_settings())
        .executor_settings(config.executor_settings())
        .watchdog_interval(config.watchdog_interval())
        .build()?;
    orchestrator.start();

    match orchestrator.restore().await {
        Ok(report) => tracing::info!(
            restored = report.restored.len(),
            skipped = report.skipped.len(),
            "startup restore complete"
        ),
        Err(err) => tracing::error!(error = %err, "startup restore failed, starting clean"),
    }
    match orchestrator.force_sync(None).await {
        Ok(report) => tracing::info!(
            synced = report.synced,
            failed = report.failed,
            "initial sync complete"
        ),
        Err(err) => tracing::warn!(error_code = %err.code(), "initial sync skipped"),
    }

    // HTTP
    let state = AppState::new(std::sync::Arc::clone(&orchestrator));
    let app = lumen_adapter_http_axum::router::build(state);

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "lumend listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down");
    orchestrator.stop();
    // a failed final save is already logged
    let _ = orchestrator.save_now().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
