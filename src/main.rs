// Shepherd - Service Registry and Metrics Rollup Orchestrator
//
// Sidecars register themselves over HTTP; the orchestrator polls each
// registrant's health endpoint, folds the returned telemetry samples into
// per-(service, metric) summaries, flushes them to SQLite once a minute,
// and periodically re-aggregates the raw rows into 120s/300s buckets.
//
// Architecture:
// - API surface (axum): /register, /services, /stats
// - Service registry: one health-checker task per registrant, a reaper
//   removing exited checkers via the shared exit channel
// - Aggregator: single-writer fold over a bounded sample channel
// - Rollup engine: ticker-driven bucket re-aggregation
// - Store: SQLite behind the MetricStore trait

mod api;
mod cli;
mod config;
mod heartbeat;
mod logging;
mod model;
mod registry;
mod rollup;
mod startup;
mod store;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use config::Config;
use registry::{AggregatorConfig, CheckerConfig, MetricsAggregator, ServiceRegistry};
use rollup::{RollupConfig, RollupEngine};
use store::{MetricStore, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Handle CLI commands first (config --show, --reset, --path)
    // If a command was handled, exit early
    if cli::handle_cli() {
        return Ok(());
    }

    // Ensure config template exists (helps users discover options)
    Config::ensure_config_exists();

    let config = Config::from_env();

    // Keep the appender guard alive for the process lifetime
    let _log_guard = logging::init(&config.logging);

    startup::print_startup(&config);
    startup::log_startup(&config);

    // Fatal init: without the store there is nothing to orchestrate
    let store: Arc<dyn MetricStore> =
        Arc::new(SqliteStore::open(&config.db_path).context("Failed to open metrics store")?);

    // Aggregator first: the registry's checkers produce into its channel
    let aggregator = MetricsAggregator::start(
        store.clone(),
        AggregatorConfig {
            flush_interval: Duration::from_secs(config.aggregator.flush_secs),
            channel_capacity: config.aggregator.channel_capacity,
        },
    );

    let registry = Arc::new(
        ServiceRegistry::new(
            aggregator.sample_sender(),
            CheckerConfig {
                interval: Duration::from_secs(config.checker.interval_secs),
                ..CheckerConfig::default()
            },
        )
        .context("Failed to create service registry")?,
    );
    registry.start();

    let rollup = RollupEngine::start(
        store.clone(),
        RollupConfig {
            lookback: Duration::from_secs(config.rollup.lookback_secs),
            cadence_120: Duration::from_secs(config.rollup.cadence_120_secs),
            cadence_300: Duration::from_secs(config.rollup.cadence_300_secs),
        },
    );

    // HTTP surface
    let app = api::router(api::AppState {
        registry: registry.clone(),
        store: store.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .context("Failed to bind to address")?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_rx.await.ok();
            })
            .await
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down...");

    // Stop accepting requests first, then unwind the pipeline front to back:
    // checkers drain through the reaper, the exit channel closes, then the
    // aggregator and rollup workers stop, and the store drops last.
    let _ = shutdown_tx.send(());
    if let Ok(Err(e)) = server.await {
        tracing::error!("Server error during shutdown: {}", e);
    }

    registry.shutdown().await;
    aggregator.stop().await;
    rollup.stop().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
