//! # beaconwatch-server
//!
//! HTTP server for beaconwatch.
//!
//! This binary provides:
//! - REST API for the desired region set, rankings and the simulated radio
//! - OpenAPI specification at `/api/openapi.json`
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package beaconwatch-server
//!
//! # Explicit config file, overridden from the environment
//! BEACONWATCH_CONFIG=./beaconwatch.toml \
//! BEACONWATCH__SERVER__BIND_ADDRESS=127.0.0.1:8080 ./beaconwatch-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;

use anyhow::Context;
use beaconwatch_core::{default_config_path, Config};
use beaconwatch_server::api::create_router;
use beaconwatch_server::logging;
use beaconwatch_server::state::AppState;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Environment variable naming the config file.
const CONFIG_PATH_ENV: &str = "BEACONWATCH_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os(CONFIG_PATH_ENV)
        .map_or_else(default_config_path, PathBuf::from);
    let config = Config::load_layered(Some(&config_path))
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    config.validate().context("invalid configuration")?;

    logging::init(config.server.production)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting beaconwatch-server"
    );

    let shutdown = CancellationToken::new();
    let (state, engine_task) = AppState::new(&config, shutdown.clone()).await?;
    let app = create_router(state);

    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down engine");
    shutdown.cancel();
    match engine_task.await {
        Ok(engine) => info!(regions = engine.desired_regions().len(), "Engine stopped"),
        Err(e) => error!(error = %e, "Engine task failed"),
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
}
