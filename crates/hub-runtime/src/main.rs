//! # Commerce Hub
//!
//! Entry point: telemetry, configuration, wiring, then serve until Ctrl+C
//! or SIGTERM.

use anyhow::{Context, Result};
use hub_runtime::{Hub, HubConfig};
use hub_telemetry::{init_telemetry, TelemetryConfig};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::from_env())
        .await
        .context("telemetry")?;

    let config = HubConfig::from_env().context("configuration")?;
    info!("===========================================");
    info!("  Commerce Hub v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");

    let listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("bind {}", config.server.listen_addr))?;
    let hub = match Hub::start(config).await {
        Ok(hub) => hub,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Hub failed to start");
            return Err(e);
        }
    };

    hub.serve(listener, shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Ctrl+C handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
