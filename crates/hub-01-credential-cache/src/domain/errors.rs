use shared_types::{ErrorCode, ErrorKind, IntegrationId};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("integration {0} not found")]
    IntegrationNotFound(IntegrationId),

    #[error("integration {0} is inactive")]
    IntegrationInactive(IntegrationId),

    #[error("integration {integration_id} belongs to provider {actual}, not {expected}")]
    ProviderMismatch {
        integration_id: IntegrationId,
        expected: String,
        actual: String,
    },

    #[error("credential field '{field}' not found on integration {integration_id}")]
    FieldNotFound {
        integration_id: IntegrationId,
        field: String,
    },

    /// Ciphertext did not authenticate under the tenant key. Retrying with
    /// the same material will fail the same way.
    #[error("credential field '{field}' on integration {integration_id} could not be decrypted")]
    DecryptionFailed {
        integration_id: IntegrationId,
        field: String,
    },

    #[error("unknown integration type '{0}'")]
    UnknownIntegrationType(String),

    #[error("invalid integration: {0}")]
    InvalidIntegration(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("shared cache error: {0}")]
    SharedCache(String),
}

impl CacheError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownIntegrationType(_) | Self::InvalidIntegration(_) => ErrorKind::Input,
            _ => ErrorKind::Resource,
        }
    }

    /// Code an outbound worker reports when this error ends a request.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::IntegrationNotFound(_) => ErrorCode::IntegrationNotFound,
            Self::IntegrationInactive(_) => ErrorCode::IntegrationInactive,
            Self::ProviderMismatch { .. } => ErrorCode::ProviderMismatch,
            Self::FieldNotFound { .. } => ErrorCode::FieldNotFound,
            Self::DecryptionFailed { .. } => ErrorCode::DecryptionFailed,
            Self::UnknownIntegrationType(_) | Self::InvalidIntegration(_) => ErrorCode::InvalidConfig,
            Self::Store(_) | Self::SharedCache(_) => ErrorCode::UpstreamError,
        }
    }
}
