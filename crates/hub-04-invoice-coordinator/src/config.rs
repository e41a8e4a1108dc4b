use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::CoordinatorError;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 3_000;
pub const DEFAULT_TOKEN_SAFETY_SECS: u64 = 1_800;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Per-attempt timeout of outbound provider calls.
    pub request_timeout_secs: u64,
    /// Extra attempts after a network error or 5xx.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Subtracted from a provider token's declared lifetime.
    pub token_safety_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            token_safety_secs: DEFAULT_TOKEN_SAFETY_SECS,
        }
    }
}

impl CoordinatorConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    #[must_use]
    pub fn token_safety(&self) -> Duration {
        Duration::from_secs(self.token_safety_secs)
    }

    /// Worst case a worker spends on one request. The broker's visibility
    /// timeout must exceed this.
    #[must_use]
    pub fn request_deadline(&self) -> Duration {
        let attempts = self.max_retries + 1;
        self.request_timeout() * attempts + self.retry_backoff() * self.max_retries
    }

    pub fn validate(&self) -> Result<(), CoordinatorError> {
        if self.request_timeout_secs == 0 {
            return Err(CoordinatorError::InvalidConfig(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
