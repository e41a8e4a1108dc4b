//! Per-tenant replay buffers.

use hub_telemetry::metrics::RING_BUFFER_EVICTIONS;
use parking_lot::RwLock;
use serde::Serialize;
use shared_types::TenantId;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use super::SequencedEvent;

/// Fixed-capacity FIFO of sequenced events.
///
/// Sequence numbers come from the router's global counter, so within one
/// buffer they are increasing but not contiguous. `evicted_upto` records the
/// highest seq pushed out, which is what gap detection needs.
#[derive(Debug)]
pub struct RingBuffer {
    capacity: usize,
    slots: VecDeque<Arc<SequencedEvent>>,
    evicted_upto: u64,
}

impl RingBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            slots: VecDeque::with_capacity(capacity),
            evicted_upto: 0,
        }
    }

    /// Append; returns the evicted event when the buffer was full.
    pub fn push(&mut self, event: Arc<SequencedEvent>) -> Option<Arc<SequencedEvent>> {
        let evicted = if self.slots.len() == self.capacity {
            self.slots.pop_front()
        } else {
            None
        };
        if let Some(old) = &evicted {
            self.evicted_upto = old.seq;
        }
        self.slots.push_back(event);
        evicted
    }

    /// Events with `seq > since_seq`, oldest first.
    #[must_use]
    pub fn since(&self, since_seq: u64) -> Vec<Arc<SequencedEvent>> {
        let start = self.slots.partition_point(|e| e.seq <= since_seq);
        self.slots.range(start..).cloned().collect()
    }

    #[must_use]
    pub fn evicted_upto(&self) -> u64 {
        self.evicted_upto
    }

    #[must_use]
    pub fn oldest_seq(&self) -> Option<u64> {
        self.slots.front().map(|e| e.seq)
    }

    #[must_use]
    pub fn latest_seq(&self) -> Option<u64> {
        self.slots.back().map(|e| e.seq)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Replay could not cover everything after `since_seq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Gap {
    pub since_seq: u64,
    /// Replay is complete from this seq onward.
    pub oldest_seq: u64,
}

/// Merged view of the buffers a stream may read.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub events: Vec<Arc<SequencedEvent>>,
    pub gap: Option<Gap>,
}

/// One ring buffer per observed tenant plus the global (tenant 0) buffer.
/// The map lock is held only to find or create a buffer; each buffer has
/// its own lock.
pub struct TenantBuffers {
    capacity: usize,
    buffers: RwLock<HashMap<TenantId, Arc<RwLock<RingBuffer>>>>,
}

impl TenantBuffers {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffers: RwLock::new(HashMap::new()),
        }
    }

    fn buffer(&self, tenant: TenantId) -> Arc<RwLock<RingBuffer>> {
        if let Some(buffer) = self.buffers.read().get(&tenant) {
            return buffer.clone();
        }
        self.buffers
            .write()
            .entry(tenant)
            .or_insert_with(|| Arc::new(RwLock::new(RingBuffer::new(self.capacity))))
            .clone()
    }

    /// Append to the owner's buffer; `None` means the global buffer.
    pub fn append(&self, owner: Option<TenantId>, event: Arc<SequencedEvent>) {
        let buffer = self.buffer(owner.unwrap_or(TenantId::SUPERUSER));
        if buffer.write().push(event).is_some() {
            RING_BUFFER_EVICTIONS.inc();
        }
    }

    /// Buffered events for `tenant` (its own buffer only) after `since_seq`.
    #[must_use]
    pub fn recent(&self, tenant: TenantId, since_seq: u64) -> Vec<Arc<SequencedEvent>> {
        self.buffers
            .read()
            .get(&tenant)
            .map(|b| b.read().since(since_seq))
            .unwrap_or_default()
    }

    /// Merge the buffers visible to `tenant`: its own plus the global one,
    /// or every buffer for the superuser. Ordered by seq.
    #[must_use]
    pub fn snapshot(&self, tenant: TenantId, since_seq: u64) -> Snapshot {
        let buffers: Vec<Arc<RwLock<RingBuffer>>> = {
            let map = self.buffers.read();
            if tenant.is_superuser() {
                map.values().cloned().collect()
            } else {
                [tenant, TenantId::SUPERUSER]
                    .iter()
                    .filter_map(|t| map.get(t).cloned())
                    .collect()
            }
        };

        let mut events = Vec::new();
        let mut lost_upto = 0;
        for buffer in &buffers {
            let buffer = buffer.read();
            if buffer.evicted_upto() > since_seq {
                lost_upto = lost_upto.max(buffer.evicted_upto());
            }
            events.extend(buffer.since(since_seq));
        }
        events.sort_by_key(|e| e.seq);

        Snapshot {
            events,
            gap: (lost_upto > 0).then_some(Gap {
                since_seq,
                oldest_seq: lost_upto + 1,
            }),
        }
    }

    /// Number of tenants with a buffer (the global buffer included).
    #[must_use]
    pub fn tenant_count(&self) -> usize {
        self.buffers.read().len()
    }
}
