//! # Error Taxonomy
//!
//! Every component error maps onto one `ErrorKind`. The RRC additionally
//! translates failures into an `ErrorCode`, the stable string that appears in
//! `InvoiceResponse.error_code`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse classification shared by all component error enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed payload, unknown event type, invalid filter.
    Input,
    /// Suppressed by subscription policy. Counted, never surfaced.
    Policy,
    /// Missing integration, missing field, undecryptable field, broker down.
    Resource,
    /// Provider HTTP failure.
    External,
    /// Broker permanently lost, master key unusable.
    Fatal,
}

impl ErrorKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Policy => "policy",
            Self::Resource => "resource",
            Self::External => "external",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable error codes carried by invoice responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MalformedRequest,
    IntegrationNotFound,
    IntegrationInactive,
    ProviderMismatch,
    FieldNotFound,
    DecryptionFailed,
    InvalidConfig,
    AuthFailed,
    ProviderError,
    RateLimited,
    UpstreamError,
    NetworkError,
    Timeout,
    ShuttingDown,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedRequest => "malformed_request",
            Self::IntegrationNotFound => "integration_not_found",
            Self::IntegrationInactive => "integration_inactive",
            Self::ProviderMismatch => "provider_mismatch",
            Self::FieldNotFound => "field_not_found",
            Self::DecryptionFailed => "decryption_failed",
            Self::InvalidConfig => "invalid_config",
            Self::AuthFailed => "auth_failed",
            Self::ProviderError => "provider_error",
            Self::RateLimited => "rate_limited",
            Self::UpstreamError => "upstream_error",
            Self::NetworkError => "network_error",
            Self::Timeout => "timeout",
            Self::ShuttingDown => "shutting_down",
        }
    }

    /// Kind this code belongs to.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedRequest | Self::InvalidConfig => ErrorKind::Input,
            Self::IntegrationNotFound
            | Self::IntegrationInactive
            | Self::ProviderMismatch
            | Self::FieldNotFound => ErrorKind::Resource,
            Self::DecryptionFailed => ErrorKind::Fatal,
            Self::AuthFailed
            | Self::ProviderError
            | Self::RateLimited
            | Self::UpstreamError
            | Self::NetworkError
            | Self::Timeout
            | Self::ShuttingDown => ErrorKind::External,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
