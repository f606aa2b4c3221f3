//! # sessionflow - service entry point
//!
//! ## Startup
//!
//! 1. **Configuration** - defaults, optional TOML file, environment overrides
//! 2. **Tracing** - `RUST_LOG`, else the configured level
//! 3. **Metrics** - Prometheus listener when `metrics_addr` is set
//! 4. **Components** - store, state, locks, events, queue, engine, coordinator
//! 5. **Loops** - session worker plus one alert monitor per signal
//!
//! ## Shutdown
//!
//! Ctrl+C stops the loops between iterations. A session that is already
//! running finishes before the worker exits.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use std::net::SocketAddr;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use sessionflow::{App, AppConfig, Cli};
use sessionflow_store::InMemoryStore;
use sessionflow_workflow::GraphDefinition;

#[tokio::main]
async fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("Invalid configuration")?;
    init_tracing(&config.log_level);

    info!("sessionflow starting...");

    if let Some(addr) = config.metrics_addr {
        init_metrics(addr)?;
    }

    let graph = match &cli.graph {
        Some(path) => GraphDefinition::load(path)
            .with_context(|| format!("Failed to load graph from '{}'", path.display()))?,
        None => GraphDefinition::default_pipeline(),
    };

    let app = App::build(config, &graph, InMemoryStore::new_arc())?;
    info!(queue = %app.queue().key(), "Components initialized");

    for topic in &cli.topics {
        app.submit(topic).await?;
    }

    let worker = app.worker().spawn();
    let monitors: Vec<_> = app
        .monitors()?
        .into_iter()
        .map(sessionflow_monitor::AlertMonitor::spawn)
        .collect();

    info!(
        "sessionflow started in {:?}; {} alert monitors running",
        start_time.elapsed(),
        monitors.len()
    );

    info!("sessionflow is running. Press Ctrl+C to stop.");
    wait_for_shutdown().await;

    info!("Stopping loops...");
    worker.stop().await;
    for monitor in monitors {
        monitor.stop().await;
    }

    info!("sessionflow stopped gracefully");
    Ok(())
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
fn init_metrics(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("Failed to start metrics listener on {addr}"))?;
    info!(%addr, "Prometheus metrics listening");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
