//! # Event Router
//!
//! **Component:** hub-03
//!
//! Moves domain events from broker state channels to long-lived HTTP
//! streams.
//!
//! ## Data Flow
//!
//! ```text
//!  broker topics ──▶ ingest task (one per channel)
//!                        │ parse, validate type, subscription policy
//!                        ▼
//!                  ┌─────────────── dispatch lock ───────────────┐
//!                  │ seq += 1                                     │
//!                  │ append to tenant ring buffer (tenant 0 = global)
//!                  │ try_send to every matching subscriber mailbox │
//!                  └──────────────────────────────────────────────┘
//!                        │
//!                        ▼
//!             egress task (one per stream): replay ─▶ live ─▶ sink
//! ```
//!
//! ## Guarantees
//!
//! | Property | Mechanism |
//! |----------|-----------|
//! | Tenant isolation | `domain::filter::admits` on replay and fan-out |
//! | Strictly increasing `seq` per stream | one global counter under the dispatch lock; replay snapshot taken under the same lock |
//! | Ingest never waits on a stream | bounded mailbox, `try_send`, drop on full |
//! | Gap disclosure | ring buffers remember the highest evicted `seq` |
//!
//! ## Stream Lifecycle
//!
//! ```text
//! Accepting ──register + snapshot──▶ Replaying ──snapshot flushed──▶ Live ──▶ Closed
//!                                                        write error / client gone / shutdown ─┘
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod domain;
pub mod egress;
pub mod http;
pub mod ingest;
pub mod registry;
pub mod router;

pub use config::RouterConfig;
pub use domain::{
    ConnectionState, Gap, RingBuffer, RouterError, SequencedEvent, StreamRequest, SubscriberFilter,
};
pub use egress::{run_egress, ChannelSink, CloseReason, EventSink, SinkError, SseFrame};
pub use http::{http_router, HttpState};
pub use ingest::start_ingest;
pub use router::{EventRouter, IngestOutcome, Subscription};
