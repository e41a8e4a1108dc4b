//! Live subscribers and non-blocking fan-out.

use chrono::{DateTime, Utc};
use hub_telemetry::metrics::{SLOW_CONSUMER_DROPS, STREAM_SUBSCRIBERS};
use parking_lot::RwLock;
use shared_types::TenantId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::filter::admits;
use crate::domain::{SequencedEvent, SubscriberFilter};

pub type ConnectionId = Uuid;
pub type Mailbox = mpsc::Receiver<Arc<SequencedEvent>>;

pub struct SubscriberEntry {
    pub connection_id: ConnectionId,
    pub tenant_id: TenantId,
    pub filter: SubscriberFilter,
    pub created_at: DateTime<Utc>,
    mailbox: mpsc::Sender<Arc<SequencedEvent>>,
    dropped: AtomicU64,
}

impl SubscriberEntry {
    /// Events dropped because the mailbox was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Result of delivering one event.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    pub dropped: usize,
}

#[derive(Default)]
pub struct SubscriberRegistry {
    entries: RwLock<HashMap<ConnectionId, Arc<SubscriberEntry>>>,
}

impl SubscriberRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber with a fresh mailbox of `capacity` slots.
    pub fn register(
        &self,
        tenant_id: TenantId,
        filter: SubscriberFilter,
        capacity: usize,
    ) -> (Arc<SubscriberEntry>, Mailbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let entry = Arc::new(SubscriberEntry {
            connection_id: Uuid::new_v4(),
            tenant_id,
            filter,
            created_at: Utc::now(),
            mailbox: tx,
            dropped: AtomicU64::new(0),
        });
        self.entries.write().insert(entry.connection_id, entry.clone());
        STREAM_SUBSCRIBERS.inc();
        debug!(connection_id = %entry.connection_id, tenant_id = %tenant_id, "Subscriber registered");
        (entry, rx)
    }

    pub fn unregister(&self, connection_id: &ConnectionId) -> bool {
        let removed = self.entries.write().remove(connection_id).is_some();
        if removed {
            STREAM_SUBSCRIBERS.dec();
            debug!(connection_id = %connection_id, "Subscriber unregistered");
        }
        removed
    }

    #[must_use]
    pub fn get(&self, connection_id: &ConnectionId) -> Option<Arc<SubscriberEntry>> {
        self.entries.read().get(connection_id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Offer `event` to every admitting subscriber. Never waits: a full
    /// mailbox loses this event for that subscriber only.
    pub fn fan_out(&self, event: &Arc<SequencedEvent>) -> FanOut {
        let mut outcome = FanOut::default();
        let entries = self.entries.read();
        for entry in entries.values() {
            if !admits(entry.tenant_id, &entry.filter, event) {
                continue;
            }
            match entry.mailbox.try_send(event.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    outcome.dropped += 1;
                    let total = entry.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    SLOW_CONSUMER_DROPS.inc();
                    warn!(
                        connection_id = %entry.connection_id,
                        seq = event.seq,
                        dropped_total = total,
                        "Slow consumer, event dropped"
                    );
                }
                // Egress is already gone and will unregister itself.
                Err(TrySendError::Closed(_)) => {}
            }
        }
        outcome
    }
}
