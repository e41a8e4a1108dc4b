//! # Resilient Topic Subscription
//!
//! A topic stream that survives broker disconnects: when the underlying
//! stream ends it resubscribes with exponential backoff (capped at 30 s) and
//! carries on. Payloads published while disconnected are lost; topics are
//! best-effort.

use crate::backoff::ExponentialBackoff;
use crate::broker::{TopicBroker, TopicStream};
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{info, warn};

pub struct ResilientSubscription<B: TopicBroker + ?Sized> {
    broker: Arc<B>,
    channel: String,
    stream: Option<TopicStream>,
    backoff: ExponentialBackoff,
    reconnects: u64,
}

impl<B: TopicBroker + ?Sized> ResilientSubscription<B> {
    /// Subscribe to `channel`, waiting (with backoff) until the broker accepts.
    pub async fn open(broker: Arc<B>, channel: impl Into<String>) -> Self {
        Self::open_with_backoff(broker, channel, ExponentialBackoff::default()).await
    }

    pub async fn open_with_backoff(
        broker: Arc<B>,
        channel: impl Into<String>,
        backoff: ExponentialBackoff,
    ) -> Self {
        let mut subscription = Self {
            broker,
            channel: channel.into(),
            stream: None,
            backoff,
            reconnects: 0,
        };
        subscription.connect().await;
        subscription
    }

    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Times the subscription had to be re-established.
    #[must_use]
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    /// Next payload. Blocks across disconnects; never returns early.
    pub async fn recv(&mut self) -> Bytes {
        loop {
            if let Some(stream) = self.stream.as_mut() {
                match stream.next().await {
                    Some(payload) => return payload,
                    None => {
                        warn!(channel = %self.channel, "Topic stream ended, reconnecting");
                        self.stream = None;
                        self.reconnects += 1;
                    }
                }
            }
            self.connect().await;
        }
    }

    async fn connect(&mut self) {
        while self.stream.is_none() {
            match self.broker.subscribe(&self.channel).await {
                Ok(stream) => {
                    self.backoff.reset();
                    self.stream = Some(stream);
                    info!(channel = %self.channel, "Subscribed to topic");
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    warn!(
                        channel = %self.channel,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Subscribe failed"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
