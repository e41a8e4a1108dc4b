//! # Broker Traits
//!
//! The two primitives every adapter provides. Payloads are raw JSON bytes;
//! typing happens at the edges (router ingest, provider workers).

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

/// Stream of payloads from one topic channel.
///
/// Ends when the broker connection is lost; see
/// [`ResilientSubscription`](crate::ResilientSubscription) for a stream that
/// reconnects.
pub type TopicStream = BoxStream<'static, Bytes>;

/// Errors from broker operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker is disconnected; publish fails fast.
    #[error("channel {channel} unavailable: broker disconnected")]
    ChannelUnavailable { channel: String },

    /// A queue operation failed at the broker.
    #[error("queue {queue} operation failed: {reason}")]
    Queue { queue: String, reason: String },

    /// Ack/nack for a delivery the broker no longer tracks.
    #[error("delivery {id} on {queue} is not in flight")]
    UnknownDelivery { queue: String, id: String },
}

impl BrokerError {
    pub(crate) fn unavailable(channel: &str) -> Self {
        Self::ChannelUnavailable {
            channel: channel.to_string(),
        }
    }

    pub(crate) fn queue(queue: &str, reason: impl ToString) -> Self {
        Self::Queue {
            queue: queue.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// One message handed out by a work queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub queue: String,
    /// Broker-assigned id used for ack/nack.
    pub id: String,
    pub payload: Bytes,
    /// True when this message was handed out before and not acked.
    pub redelivered: bool,
}

/// Best-effort broadcast topics.
#[async_trait]
pub trait TopicBroker: Send + Sync {
    /// Publish a payload. Returns the number of live subscribers reached,
    /// or `ChannelUnavailable` when the broker is disconnected.
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<usize, BrokerError>;

    /// Open a stream of every payload published to `channel` from now on.
    async fn subscribe(&self, channel: &str) -> Result<TopicStream, BrokerError>;

    /// Whether the adapter currently holds a broker connection.
    fn is_connected(&self) -> bool;
}

/// Durable work queues with competing consumers.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Create the queue if it does not exist.
    async fn declare_queue(&self, name: &str, durable: bool) -> Result<(), BrokerError>;

    async fn enqueue(&self, name: &str, payload: Bytes) -> Result<(), BrokerError>;

    /// Wait briefly for the next delivery. `Ok(None)` means nothing arrived
    /// within the adapter's poll window; callers loop.
    async fn receive(&self, name: &str, consumer: &str) -> Result<Option<Delivery>, BrokerError>;

    /// Remove a delivery for good.
    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError>;

    /// Give a delivery back; it is redelivered after the visibility timeout.
    async fn nack(&self, delivery: &Delivery) -> Result<(), BrokerError>;
}

/// Both primitives over one connection.
pub trait Broker: TopicBroker + WorkQueue {}

impl<T: TopicBroker + WorkQueue> Broker for T {}
