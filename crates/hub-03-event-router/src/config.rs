use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::RouterError;

pub const DEFAULT_RING_SIZE: usize = 256;
pub const DEFAULT_MAILBOX_SIZE: usize = 64;
pub const DEFAULT_KEEPALIVE_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Per-tenant replay buffer capacity.
    pub ring_size: usize,
    /// Per-subscriber mailbox capacity.
    pub mailbox_size: usize,
    /// Idle interval before a keep-alive frame.
    pub keepalive_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            ring_size: DEFAULT_RING_SIZE,
            mailbox_size: DEFAULT_MAILBOX_SIZE,
            keepalive_secs: DEFAULT_KEEPALIVE_SECS,
        }
    }
}

impl RouterConfig {
    #[must_use]
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    pub fn validate(&self) -> Result<(), RouterError> {
        if self.ring_size == 0 {
            return Err(RouterError::InvalidConfig("ring_size must be at least 1".into()));
        }
        if self.mailbox_size == 0 {
            return Err(RouterError::InvalidConfig("mailbox_size must be at least 1".into()));
        }
        if self.keepalive_secs == 0 {
            return Err(RouterError::InvalidConfig("keepalive_secs must be at least 1".into()));
        }
        Ok(())
    }
}
