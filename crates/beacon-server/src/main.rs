//! # beacon-server
//!
//! Host process for beacon-logger.
//!
//! - Loads configuration (`BEACON_CONFIG` or the platform default path)
//! - Drives the monitor from the scanner's event stream
//! - Serves the control API and Swagger UI
//! - Deactivates the monitor on shutdown so the session file is closed
//!
//! ## Running
//!
//! ```bash
//! # Development, mock scanner
//! cargo run --package beacon-server
//!
//! # On the device
//! BEACON_ENV=production ./beacon-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use beacon_core::{default_config_path, event_channel, run_event_loop, Config, EventSender};
use beacon_server::api::create_router;
use beacon_server::logging;
use beacon_server::state::{AppState, DynScanner};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// Environment variable overriding the configuration file path.
const CONFIG_PATH_VAR: &str = "BEACON_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(logging::is_production())?;

    let config_path = std::env::var_os(CONFIG_PATH_VAR)
        .map_or_else(default_config_path, PathBuf::from);
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    info!(
        config = %config_path.display(),
        region = %config.region.name,
        sessions = %config.logging.directory.display(),
        "Starting beacon-server"
    );

    let (events_tx, events_rx) = event_channel();
    let scanner = build_scanner(&config, events_tx).await?;
    let state = AppState::new(config.clone(), scanner).into_shared();

    let pump = tokio::spawn(run_event_loop(Arc::clone(&state.monitor), events_rx));

    if config.server.activate_on_start {
        if let Err(e) = state.monitor.lock().await.activate() {
            warn!(error = %e, "Monitoring not started; activate via the API once resolved");
        }
    }

    let listener = TcpListener::bind(config.server.bind_address)
        .await
        .with_context(|| format!("binding {}", config.server.bind_address))?;
    info!(addr = %config.server.bind_address, "Listening");

    axum::serve(listener, create_router(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = state.monitor.lock().await.deactivate() {
        warn!(error = %e, "Radio errors while deactivating");
    }
    pump.abort();

    info!("Shutdown complete");
    Ok(())
}

#[cfg(feature = "bluetooth")]
async fn build_scanner(config: &Config, events: EventSender) -> anyhow::Result<DynScanner> {
    let scanner = beacon_core::BluezScanner::spawn(config.scan, events)
        .await
        .context("opening the Bluetooth adapter")?;
    Ok(Box::new(scanner))
}

#[cfg(not(feature = "bluetooth"))]
#[allow(clippy::unused_async)]
async fn build_scanner(_config: &Config, events: EventSender) -> anyhow::Result<DynScanner> {
    warn!("Built without the `bluetooth` feature, running with the mock scanner");
    drop(events);
    Ok(Box::new(beacon_core::MockScanner::new()))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for Ctrl+C");
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
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => warn!("Received Ctrl+C, shutting down"),
        () = terminate => warn!("Received SIGTERM, shutting down"),
    }
}
