//! # Shared Bus - Broker Adapter
//!
//! Two orthogonal delivery primitives over one underlying broker:
//!
//! - **Topics** (`TopicBroker`): best-effort broadcast. Every live subscriber
//!   on a channel receives a copy; nobody listening means the payload is gone.
//! - **Work queues** (`WorkQueue`): durable, competing consumers,
//!   at-least-once. A delivery that is not acked within the visibility
//!   timeout is handed to the next consumer.
//!
//! ```text
//!  producers ──publish()──▶ ┌──────────────┐ ──subscribe()──▶ event router
//!                           │    Broker    │
//!  producers ──enqueue()──▶ │ topic│queue  │ ──receive()────▶ provider workers
//!                           └──────────────┘ ◀──ack()/nack()──
//! ```
//!
//! ## Adapters
//!
//! - `InMemoryBroker` (default): tokio broadcast channels and in-process
//!   queues. Single-process deployments and tests.
//! - `RedisBroker` (feature `redis`): Redis pub/sub for topics, Redis
//!   streams with consumer groups for queues.
//!
//! ## Channel Names
//!
//! Reserved channel and queue names come from [`channels`]. Never spell a
//! channel name inline; publishers and subscribers drift apart otherwise.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod backoff;
pub mod broker;
pub mod channels;
pub mod memory;
pub mod queue;
#[cfg(feature = "redis")]
pub mod redis;
pub mod subscriber;

pub use backoff::ExponentialBackoff;
pub use broker::{Broker, BrokerError, Delivery, TopicBroker, TopicStream, WorkQueue};
pub use channels::{ChannelNames, ProviderFamily, StateChannel};
pub use memory::InMemoryBroker;
pub use queue::{consume, Ack, QueueHandler};
#[cfg(feature = "redis")]
pub use redis::{RedisBroker, RedisBrokerConfig};
pub use subscriber::ResilientSubscription;

/// Per-channel buffer of the in-memory broadcast topics.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default time a delivery may stay unacked before it is redelivered.
///
/// Must exceed the worst-case outbound call of a provider worker
/// (30 s timeout, two retries, 3 s backoff each).
pub const DEFAULT_VISIBILITY_TIMEOUT_SECS: u64 = 120;

/// Upper bound on the reconnect backoff.
pub const MAX_RECONNECT_BACKOFF_SECS: u64 = 30;
