//! Correlation table bridging an enqueued request to its response.
//!
//! Flow:
//! 1. The producer registers the request's correlation id and gets a receiver
//! 2. The request is enqueued on the provider's work queue
//! 3. A response listener calls `complete()` when the correlated reply arrives
//! 4. The producer awaits the receiver or gives up at its deadline

use dashmap::DashMap;
use shared_types::{CorrelationId, InvoiceResponse};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

struct PendingRequest {
    sender: oneshot::Sender<InvoiceResponse>,
    created_at: Instant,
    invoice_id: u64,
    provider: String,
    timeout: Duration,
}

#[derive(Debug, Default)]
pub struct PendingStats {
    pub total_registered: AtomicU64,
    pub total_completed: AtomicU64,
    pub total_timeouts: AtomicU64,
    /// Waiter gone before its response arrived.
    pub total_cancelled: AtomicU64,
}

pub struct PendingRequestStore {
    pending: DashMap<CorrelationId, PendingRequest>,
    default_timeout: Duration,
    stats: PendingStats,
}

impl PendingRequestStore {
    #[must_use]
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            default_timeout,
            stats: PendingStats::default(),
        }
    }

    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Start waiting for the response to `correlation_id`.
    pub fn register(
        &self,
        correlation_id: CorrelationId,
        invoice_id: u64,
        provider: &str,
        timeout: Option<Duration>,
    ) -> oneshot::Receiver<InvoiceResponse> {
        let (tx, rx) = oneshot::channel();
        let request = PendingRequest {
            sender: tx,
            created_at: Instant::now(),
            invoice_id,
            provider: provider.to_string(),
            timeout: timeout.unwrap_or(self.default_timeout),
        };

        if self.pending.insert(correlation_id.clone(), request).is_some() {
            warn!(correlation_id = %correlation_id, "Correlation id re-registered, earlier waiter dropped");
        }
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
        debug!(correlation_id = %correlation_id, invoice_id, provider, "Registered pending request");
        rx
    }

    /// Hand `response` to its waiter. False if nobody is waiting for it
    /// (unknown, expired, or already answered).
    pub fn complete(&self, response: InvoiceResponse) -> bool {
        let Some((correlation_id, pending)) = self.pending.remove(&response.correlation_id) else {
            debug!(
                correlation_id = %response.correlation_id,
                "Response for unknown or expired correlation id"
            );
            return false;
        };

        let waited = pending.created_at.elapsed();
        match pending.sender.send(response) {
            Ok(()) => {
                self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %correlation_id,
                    invoice_id = pending.invoice_id,
                    provider = %pending.provider,
                    waited_ms = waited.as_millis() as u64,
                    "Completed pending request"
                );
                true
            }
            Err(_) => {
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(correlation_id = %correlation_id, "Pending request receiver dropped");
                false
            }
        }
    }

    /// Drop requests older than their timeout. Returns how many.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.pending.retain(|id, request| {
            let elapsed = now.duration_since(request.created_at);
            if elapsed > request.timeout {
                warn!(
                    correlation_id = %id,
                    invoice_id = request.invoice_id,
                    provider = %request.provider,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Removing expired pending request"
                );
                self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
                removed += 1;
                false
            } else {
                true
            }
        });

        removed
    }

    pub fn cancel(&self, correlation_id: &CorrelationId) -> bool {
        if self.pending.remove(correlation_id).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn is_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.pending.contains_key(correlation_id)
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

/// Sweep expired entries every `interval` until shutdown.
pub async fn cleanup_task(
    store: Arc<PendingRequestStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = store.remove_expired();
                if removed > 0 {
                    debug!(removed, "Cleaned up expired pending requests");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
