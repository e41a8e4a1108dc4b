//! # Hub Telemetry
//!
//! Logging, tracing and metrics for every hub component.
//!
//! - **Logs**: `tracing-subscriber` registry with `EnvFilter`, JSON or pretty
//!   output.
//! - **Traces**: optional OTLP export when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
//! - **Metrics**: Prometheus counters in a process-wide registry, encoded by
//!   [`encode_metrics`] for the `/metrics` endpoint.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hub_telemetry::{init_telemetry, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).await?;
//!     // ...
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RUST_LOG` | `info` | Log filter |
//! | `LOG_FORMAT` | `pretty` | `json` or `pretty` |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | unset | OTLP collector; tracing export is off when unset |
//! | `OTEL_SERVICE_NAME` | `commerce-hub` | Service name on spans |

mod config;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{encode_metrics, register_metrics};
pub use tracing_setup::TracingGuard;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("failed to initialize tracing: {0}")]
    TracerInit(String),

    #[error("failed to initialize metrics: {0}")]
    MetricsInit(String),
}

/// Install logging, optional trace export and the metrics registry.
///
/// Hold the returned guard for the life of the process; dropping it flushes
/// pending spans.
pub async fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    register_metrics()?;
    let tracing = tracing_setup::init_tracing(&config).await?;
    Ok(TelemetryGuard { _tracing: tracing })
}

pub struct TelemetryGuard {
    _tracing: TracingGuard,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry");
    }
}
