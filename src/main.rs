//! Muni Core server
//!
//! Serves the content platform API with background cleanup, scheduling,
//! health and metrics loops.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use muni_core::api::{create_router, AppState};
use muni_core::config::Config;
use muni_core::tasks::{
    spawn_cleanup_task, spawn_health_task, spawn_metrics_task, spawn_scheduler_task,
    MetricsSources,
};
use muni_core::telemetry::{spawn_telemetry_drain, Telemetry};

/// Main entry point.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration and tenant profiles
/// 3. Build caches, gate, validation queue and pipeline
/// 4. Start background tasks
/// 5. Serve until SIGINT/SIGTERM, then drain the pipeline
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "muni_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Muni Core");

    let config = Config::from_env();
    config.validate().context("invalid configuration")?;
    let profiles = config
        .load_tenant_profiles()
        .context("loading tenant profiles")?;
    if profiles.is_empty() {
        warn!("No tenant profiles configured; every tenant request will be rejected");
    }
    info!(
        port = config.server_port,
        cache_nodes = config.cache.nodes,
        tenants = profiles.len(),
        "Configuration loaded"
    );

    let (telemetry, events) = Telemetry::channel(config.telemetry_buffer);
    let drain_handle = spawn_telemetry_drain(events);

    let state = AppState::from_config(&config, profiles, telemetry.clone())
        .context("building application state")?;

    let clusters = vec![state.cache.clone(), state.limiter.clone()];
    let handles = vec![
        spawn_cleanup_task(clusters.clone(), config.cleanup_interval),
        spawn_scheduler_task(state.pipeline.clone(), config.pipeline.tick_interval),
        spawn_health_task(clusters.clone(), state.validation.clone(), config.health_interval),
        spawn_metrics_task(
            MetricsSources {
                clusters,
                gate: state.gate.clone(),
                pipeline: state.pipeline.clone(),
            },
            telemetry,
            config.metrics_interval,
        ),
    ];
    info!("Background tasks started");

    let pipeline = state.pipeline.clone();
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    let report = pipeline.shutdown(config.shutdown_grace).await;
    info!(
        drained = report.drained,
        remaining_active = report.remaining_active,
        cancelled = report.cancelled,
        "Pipeline stopped"
    );

    for handle in handles {
        handle.abort();
    }
    drain_handle.abort();
    warn!("Background tasks aborted");

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
