//! # drivesafe-server
//!
//! Runs the detection worker against the distance sensor and serves the
//! HTTP API the vehicle, the messaging provider and the companion client
//! talk to.
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package drivesafe-server
//!
//! # Production
//! DRIVESAFE_ENV=production ./drivesafe-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::time::Duration;

use anyhow::Context;
use drivesafe_core::{Config, DetectionController};
use drivesafe_server::api::create_router;
use drivesafe_server::logging;
use drivesafe_server::state::AppState;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// How long runtime shutdown waits for blocking-pool work to finish.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    let result = runtime.block_on(serve());
    // A device read parked on a silent tty never returns on its own.
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

async fn serve() -> anyhow::Result<()> {
    logging::init(logging::is_production())?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting drivesafe-server");

    let config = Config::load_validated().context("loading configuration")?;
    info!(
        sensor = %config.sensor.source,
        threshold_cm = config.detection.threshold_cm,
        debounce_secs = config.detection.debounce_secs,
        audit = %config.audit.path.display(),
        "Configuration loaded"
    );
    if !config.sms.is_configured() {
        warn!("SMS credentials not configured, auto-replies will be audited as failed");
    }

    let state = AppState::new(config)?;
    let mut controller = DetectionController::new();
    controller.start(state.detection_worker()?)?;

    let server = &state.config().server;
    let listener = TcpListener::bind((server.host.as_str(), server.port))
        .await
        .with_context(|| format!("binding {}:{}", server.host, server.port))?;
    info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, create_router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down detection worker");
    if let Err(err) = controller.stop().await {
        warn!(error = %err, "Detection worker had already failed");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
