//! Provider auth tokens, cached per integration.
//!
//! Each integration has its own async mutex. It is held only while a token
//! is checked or refreshed, so concurrent requests for one integration
//! trigger a single re-auth and requests for other integrations are never
//! blocked by it. Callers receive an owned copy of the token: a later
//! refresh never changes the token an in-flight request already uses.

use parking_lot::Mutex;
use shared_types::IntegrationId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use zeroize::Zeroizing;

/// A token as returned by a provider's auth endpoint.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: Zeroizing<String>,
    /// Lifetime the provider declared.
    pub expires_in: Duration,
}

/// How long to reuse a token: the declared lifetime minus the safety
/// buffer, or half the declared lifetime when that would not be positive.
#[must_use]
pub fn effective_ttl(declared: Duration, safety: Duration) -> Duration {
    if declared > safety {
        declared - safety
    } else {
        declared / 2
    }
}

struct CachedToken {
    token: Zeroizing<String>,
    refresh_at: Instant,
}

type Slot = Arc<tokio::sync::Mutex<Option<CachedToken>>>;

pub struct TokenCache {
    safety: Duration,
    slots: Mutex<HashMap<IntegrationId, Slot>>,
}

impl TokenCache {
    #[must_use]
    pub fn new(safety: Duration) -> Self {
        Self {
            safety,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, id: IntegrationId) -> Slot {
        self.slots.lock().entry(id).or_default().clone()
    }

    /// Cached token for `id`, or the result of `authenticate` when there is
    /// none or it is due for refresh.
    pub async fn get_or_refresh<F, Fut, E>(
        &self,
        id: IntegrationId,
        authenticate: F,
    ) -> Result<Zeroizing<String>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<IssuedToken, E>>,
    {
        let slot = self.slot(id);
        let mut cached = slot.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.token.clone());
            }
        }

        let issued = authenticate().await?;
        let ttl = effective_ttl(issued.expires_in, self.safety);
        debug!(
            integration_id = %id,
            declared_secs = issued.expires_in.as_secs(),
            ttl_secs = ttl.as_secs(),
            "Provider token refreshed"
        );
        *cached = Some(CachedToken {
            token: issued.token.clone(),
            refresh_at: Instant::now() + ttl,
        });
        Ok(issued.token)
    }

    /// Forget the token for `id`; the next call re-authenticates.
    pub async fn invalidate(&self, id: IntegrationId) {
        let slot = self.slot(id);
        *slot.lock().await = None;
    }
}
