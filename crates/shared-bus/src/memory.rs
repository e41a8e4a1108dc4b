//! # In-Memory Broker
//!
//! Topics are `tokio::sync::broadcast` channels created on first use. Queues
//! keep a ready list plus an in-flight table; an unacked delivery becomes
//! visible again once its visibility deadline passes.

use crate::broker::{BrokerError, Delivery, TopicBroker, TopicStream, WorkQueue};
use crate::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_VISIBILITY_TIMEOUT_SECS};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::time::Instant;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

struct QueuedMessage {
    id: String,
    payload: Bytes,
    delivered: bool,
}

struct InFlight {
    message: QueuedMessage,
    visible_at: Instant,
}

struct QueueState {
    ready: VecDeque<QueuedMessage>,
    in_flight: HashMap<String, InFlight>,
    notify: Arc<Notify>,
    next_id: u64,
}

impl QueueState {
    fn new() -> Self {
        Self {
            ready: VecDeque::new(),
            in_flight: HashMap::new(),
            notify: Arc::new(Notify::new()),
            next_id: 0,
        }
    }

    /// Move deliveries whose visibility deadline passed back to the front.
    fn requeue_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, f)| f.visible_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            if let Some(flight) = self.in_flight.remove(&id) {
                debug!(id = %id, "Visibility timeout elapsed, requeueing");
                self.ready.push_front(flight.message);
            }
        }
    }
}

/// Single-process broker.
pub struct InMemoryBroker {
    topics: RwLock<HashMap<String, broadcast::Sender<Bytes>>>,
    queues: Mutex<HashMap<String, QueueState>>,
    connected: AtomicBool,
    capacity: usize,
    visibility_timeout: Duration,
    poll_interval: Duration,
    published: AtomicU64,
}

impl InMemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(true),
            capacity,
            visibility_timeout: Duration::from_secs(DEFAULT_VISIBILITY_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(250),
            published: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// How long `receive` waits before returning `Ok(None)`.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Drop the connection: open topic streams end, publishes fail.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.topics.write().clear();
        warn!("In-memory broker disconnected");
    }

    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
        debug!("In-memory broker reconnected");
    }

    /// Live subscribers on a channel.
    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.topics
            .read()
            .get(channel)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// `(ready, in_flight)` counts for a queue.
    #[must_use]
    pub fn queue_depth(&self, name: &str) -> (usize, usize) {
        self.queues
            .lock()
            .get(name)
            .map_or((0, 0), |q| (q.ready.len(), q.in_flight.len()))
    }

    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    fn ensure_connected(&self, channel: &str) -> Result<(), BrokerError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::unavailable(channel))
        }
    }

    fn try_take(&self, name: &str) -> Result<Delivery, Arc<Notify>> {
        let mut queues = self.queues.lock();
        let state = queues.entry(name.to_string()).or_insert_with(QueueState::new);
        let now = Instant::now();
        state.requeue_expired(now);

        match state.ready.pop_front() {
            Some(mut message) => {
                let delivery = Delivery {
                    queue: name.to_string(),
                    id: message.id.clone(),
                    payload: message.payload.clone(),
                    redelivered: message.delivered,
                };
                message.delivered = true;
                state.in_flight.insert(
                    message.id.clone(),
                    InFlight {
                        message,
                        visible_at: now + self.visibility_timeout,
                    },
                );
                Ok(delivery)
            }
            None => Err(state.notify.clone()),
        }
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TopicBroker for InMemoryBroker {
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<usize, BrokerError> {
        self.ensure_connected(channel)?;
        self.published.fetch_add(1, Ordering::Relaxed);

        let topics = self.topics.read();
        let Some(sender) = topics.get(channel) else {
            debug!(channel = channel, "Published to channel with no subscribers");
            return Ok(0);
        };
        match sender.send(payload) {
            Ok(receivers) => {
                debug!(channel = channel, receivers = receivers, "Payload published");
                Ok(receivers)
            }
            Err(_) => {
                debug!(channel = channel, "Payload dropped (no receivers)");
                Ok(0)
            }
        }
    }

    async fn subscribe(&self, channel: &str) -> Result<TopicStream, BrokerError> {
        self.ensure_connected(channel)?;
        let receiver = {
            let mut topics = self.topics.write();
            topics
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };
        debug!(channel = channel, "Topic subscription opened");

        let channel = channel.to_string();
        let stream = tokio_stream::StreamExt::filter_map(
            BroadcastStream::new(receiver),
            move |item| match item {
                Ok(payload) => Some(payload),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(channel = %channel, skipped = skipped, "Topic subscriber lagged");
                    None
                }
            },
        );
        Ok(Box::pin(stream))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkQueue for InMemoryBroker {
    async fn declare_queue(&self, name: &str, durable: bool) -> Result<(), BrokerError> {
        self.ensure_connected(name)?;
        self.queues
            .lock()
            .entry(name.to_string())
            .or_insert_with(QueueState::new);
        debug!(queue = name, durable = durable, "Queue declared");
        Ok(())
    }

    async fn enqueue(&self, name: &str, payload: Bytes) -> Result<(), BrokerError> {
        self.ensure_connected(name)?;
        let notify = {
            let mut queues = self.queues.lock();
            let state = queues.entry(name.to_string()).or_insert_with(QueueState::new);
            state.next_id += 1;
            let id = format!("{}-{}", name, state.next_id);
            state.ready.push_back(QueuedMessage {
                id,
                payload,
                delivered: false,
            });
            state.notify.clone()
        };
        notify.notify_one();
        Ok(())
    }

    async fn receive(&self, name: &str, _consumer: &str) -> Result<Option<Delivery>, BrokerError> {
        self.ensure_connected(name)?;
        let notify = match self.try_take(name) {
            Ok(delivery) => return Ok(Some(delivery)),
            Err(notify) => notify,
        };
        // Woken by enqueue, or wake up anyway to re-check visibility deadlines.
        let _ = tokio::time::timeout(self.poll_interval, notify.notified()).await;
        Ok(self.try_take(name).ok())
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let mut queues = self.queues.lock();
        queues
            .get_mut(&delivery.queue)
            .and_then(|q| q.in_flight.remove(&delivery.id))
            .map(|_| ())
            .ok_or_else(|| BrokerError::UnknownDelivery {
                queue: delivery.queue.clone(),
                id: delivery.id.clone(),
            })
    }

    async fn nack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let mut queues = self.queues.lock();
        let flight = queues
            .get_mut(&delivery.queue)
            .and_then(|q| q.in_flight.get_mut(&delivery.id))
            .ok_or_else(|| BrokerError::UnknownDelivery {
                queue: delivery.queue.clone(),
                id: delivery.id.clone(),
            })?;
        flight.visible_at = Instant::now() + self.visibility_timeout;
        debug!(queue = %delivery.queue, id = %delivery.id, "Delivery nacked");
        Ok(())
    }
}
