//! Router core: sequencing, buffering, fan-out, stream registration.

use hub_02_subscription_policy::{EventMeta, NotificationPolicy};
use hub_telemetry::metrics::{EVENTS_DROPPED, EVENTS_INGESTED};
use parking_lot::Mutex;
use shared_types::{DomainEvent, TenantId};
use std::sync::Arc;
use tracing::debug;

use crate::config::RouterConfig;
use crate::domain::filter::admits;
use crate::domain::{Gap, RouterError, SequencedEvent, Snapshot, StreamRequest, TenantBuffers};
use crate::registry::{ConnectionId, Mailbox, SubscriberEntry, SubscriberRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Buffered { seq: u64, delivered: usize },
    /// Policy said no; only superuser streams were offered the event.
    Suppressed { seq: u64, delivered: usize },
}

impl IngestOutcome {
    #[must_use]
    pub fn seq(&self) -> u64 {
        match self {
            Self::Buffered { seq, .. } | Self::Suppressed { seq, .. } => *seq,
        }
    }
}

pub struct EventRouter {
    config: RouterConfig,
    policy: Arc<dyn NotificationPolicy>,
    buffers: TenantBuffers,
    registry: Arc<SubscriberRegistry>,
    /// Last assigned seq. Held across assign, append and fan-out, and while
    /// a new stream registers and snapshots.
    dispatch: Mutex<u64>,
}

impl EventRouter {
    #[must_use]
    pub fn new(config: RouterConfig, policy: Arc<dyn NotificationPolicy>) -> Self {
        Self {
            buffers: TenantBuffers::new(config.ring_size),
            registry: Arc::new(SubscriberRegistry::new()),
            dispatch: Mutex::new(0),
            config,
            policy,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Parse, validate and police one broker payload, then publish it.
    pub async fn ingest(&self, channel: &str, payload: &[u8]) -> Result<IngestOutcome, RouterError> {
        let event = DomainEvent::from_slice(payload).map_err(|e| {
            EVENTS_DROPPED.with_label_values(&["malformed"]).inc();
            RouterError::MalformedEvent(e.to_string())
        })?;
        let event_type = event.validated_type().map_err(|e| {
            EVENTS_DROPPED.with_label_values(&["unknown_type"]).inc();
            RouterError::from(e)
        })?;
        EVENTS_INGESTED.with_label_values(&[channel]).inc();

        let suppressed = match event.owning_tenant() {
            Some(tenant) => {
                let meta = EventMeta::from_event(&event);
                !self.policy.should_notify(tenant, event_type.as_str(), &meta).await
            }
            None => false,
        };
        Ok(self.publish(event, suppressed))
    }

    /// Assign the next seq, buffer (unless suppressed) and fan out.
    pub fn publish(&self, event: DomainEvent, suppressed: bool) -> IngestOutcome {
        let mut last = self.dispatch.lock();
        *last += 1;
        let seq = *last;

        let owner = event.owning_tenant();
        let event = Arc::new(SequencedEvent {
            seq,
            event,
            suppressed,
        });
        if !suppressed {
            self.buffers.append(owner, event.clone());
        }
        let fan_out = self.registry.fan_out(&event);
        drop(last);

        debug!(
            seq = seq,
            event_type = %event.event.event_type,
            tenant_id = ?owner.map(|t| t.0),
            delivered = fan_out.delivered,
            dropped = fan_out.dropped,
            suppressed = suppressed,
            "Event dispatched"
        );

        if suppressed {
            IngestOutcome::Suppressed {
                seq,
                delivered: fan_out.delivered,
            }
        } else {
            IngestOutcome::Buffered {
                seq,
                delivered: fan_out.delivered,
            }
        }
    }

    /// Register a stream and take its replay snapshot atomically with
    /// respect to dispatch: every event is either in the replay or in the
    /// mailbox, never both and never neither.
    #[must_use]
    pub fn open_stream(&self, request: StreamRequest) -> Subscription {
        let StreamRequest {
            tenant_id,
            filter,
            since_seq,
        } = request;

        let (entry, mailbox, tip, snapshot) = {
            let last = self.dispatch.lock();
            let (entry, mailbox) = self
                .registry
                .register(tenant_id, filter, self.config.mailbox_size);
            let snapshot = since_seq
                .map(|since| self.buffers.snapshot(tenant_id, since))
                .unwrap_or_default();
            (entry, mailbox, *last, snapshot)
        };

        let Snapshot { events, gap } = snapshot;
        let replay = events
            .into_iter()
            .filter(|e| admits(entry.tenant_id, &entry.filter, e))
            .collect();

        Subscription {
            registration: Registration {
                registry: self.registry.clone(),
                connection_id: entry.connection_id,
            },
            entry,
            replay,
            tip,
            gap,
            mailbox,
        }
    }

    /// Buffered events of one tenant after `since_seq` (its own buffer only;
    /// tenant 0 is the global buffer).
    #[must_use]
    pub fn recent_events(&self, tenant_id: TenantId, since_seq: u64) -> Vec<Arc<SequencedEvent>> {
        self.buffers.recent(tenant_id, since_seq)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    #[must_use]
    pub fn tenants_buffered(&self) -> usize {
        self.buffers.tenant_count()
    }

    #[must_use]
    pub fn last_seq(&self) -> u64 {
        *self.dispatch.lock()
    }

    #[must_use]
    pub fn subscriber(&self, connection_id: &ConnectionId) -> Option<Arc<SubscriberEntry>> {
        self.registry.get(connection_id)
    }
}

struct Registration {
    registry: Arc<SubscriberRegistry>,
    connection_id: ConnectionId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(&self.connection_id);
    }
}

/// An open stream. Dropping it unregisters the subscriber.
pub struct Subscription {
    entry: Arc<SubscriberEntry>,
    /// Admitted buffered events after `since_seq`, in seq order.
    pub replay: Vec<Arc<SequencedEvent>>,
    /// Highest seq assigned when the snapshot was taken.
    pub tip: u64,
    pub gap: Option<Gap>,
    mailbox: Mailbox,
    registration: Registration,
}

impl Subscription {
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.registration.connection_id
    }

    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.entry.tenant_id
    }

    /// Events dropped for this stream because its mailbox was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.entry.dropped()
    }

    /// Next live event after the snapshot tip. `None` once the router is gone.
    pub async fn next_live(&mut self) -> Option<Arc<SequencedEvent>> {
        loop {
            let event = self.mailbox.recv().await?;
            if event.seq > self.tip {
                return Some(event);
            }
        }
    }
}
