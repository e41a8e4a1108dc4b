//! Telemetry configuration from environment variables.

use std::env;

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// OTLP collector endpoint; `None` disables trace export.
    pub otlp_endpoint: Option<String>,
    pub log_level: String,
    pub json_logs: bool,
    pub environment: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "commerce-hub".to_string(),
            otlp_endpoint: None,
            log_level: "info".to_string(),
            json_logs: false,
            environment: "development".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Read `OTEL_SERVICE_NAME`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `RUST_LOG`,
    /// `LOG_FORMAT` and `HUB_ENVIRONMENT`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: env::var("OTEL_SERVICE_NAME").unwrap_or(defaults.service_name),
            otlp_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            log_level: env::var("RUST_LOG").unwrap_or(defaults.log_level),
            json_logs: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(defaults.json_logs),
            environment: env::var("HUB_ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }
}
