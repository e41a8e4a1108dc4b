use hub_01_credential_cache::CacheError;
use shared_bus::BrokerError;
use shared_types::{ErrorCode, ErrorKind};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error(transparent)]
    Credentials(#[from] CacheError),

    #[error("invalid provider config: {0}")]
    InvalidConfig(String),

    #[error("provider authentication failed: {0}")]
    AuthFailed(String),

    /// 4xx with a business error body. Not retried.
    #[error("provider rejected request ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("provider rate limit hit")]
    RateLimited,

    /// 5xx after the retry budget, or an unreadable success body.
    #[error("provider upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("no response within {0} ms")]
    Timeout(u64),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("coordinator is shutting down")]
    ShuttingDown,
}

impl CoordinatorError {
    /// Stable code carried on the response envelope.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::MalformedRequest(_) => ErrorCode::MalformedRequest,
            Self::Credentials(e) => e.error_code(),
            Self::InvalidConfig(_) => ErrorCode::InvalidConfig,
            Self::AuthFailed(_) => ErrorCode::AuthFailed,
            Self::Provider { .. } => ErrorCode::ProviderError,
            Self::RateLimited => ErrorCode::RateLimited,
            Self::Upstream { .. } | Self::Broker(_) => ErrorCode::UpstreamError,
            Self::Network(_) => ErrorCode::NetworkError,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::ShuttingDown => ErrorCode::ShuttingDown,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Credentials(e) => e.kind(),
            other => other.error_code().kind(),
        }
    }

    /// Worth another attempt inside the HTTP client.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Upstream { .. })
    }
}
