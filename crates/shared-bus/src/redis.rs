//! # Redis Broker
//!
//! - Topics: Redis pub/sub. A dedicated pub/sub connection per subscription;
//!   the stream ends when that connection drops.
//! - Queues: Redis streams with one consumer group. `XREADGROUP ... >` hands
//!   out new entries; entries left pending longer than the visibility timeout
//!   are taken over with `XAUTOCLAIM`. `XACK` settles.

use crate::broker::{BrokerError, Delivery, TopicBroker, TopicStream, WorkQueue};
use crate::DEFAULT_VISIBILITY_TIMEOUT_SECS;
use async_trait::async_trait;
use bytes::Bytes;
use deadpool_redis::redis::streams::{StreamReadOptions, StreamReadReply};
use deadpool_redis::redis::{cmd, AsyncCommands, Value as RedisValue};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

const PAYLOAD_FIELD: &str = "payload";

#[derive(Debug, Clone)]
pub struct RedisBrokerConfig {
    pub url: String,
    /// Consumer group shared by every worker of a queue.
    pub group: String,
    /// How long one `XREADGROUP` blocks.
    pub block: Duration,
    pub visibility_timeout: Duration,
}

impl RedisBrokerConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            group: "hub-workers".to_string(),
            block: Duration::from_secs(2),
            visibility_timeout: Duration::from_secs(DEFAULT_VISIBILITY_TIMEOUT_SECS),
        }
    }
}

pub struct RedisBroker {
    pool: Pool,
    client: deadpool_redis::redis::Client,
    config: RedisBrokerConfig,
    connected: AtomicBool,
}

impl RedisBroker {
    /// Build the connection pool. No connection is made until first use.
    pub fn connect(config: RedisBrokerConfig) -> Result<Self, BrokerError> {
        let pool = Config::from_url(config.url.clone())
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| BrokerError::queue("redis", e))?;
        let client = deadpool_redis::redis::Client::open(config.url.as_str())
            .map_err(|e| BrokerError::queue("redis", e))?;
        info!(group = %config.group, "Redis broker configured");
        Ok(Self {
            pool,
            client,
            config,
            connected: AtomicBool::new(true),
        })
    }

    async fn conn(&self, channel: &str) -> Result<Connection, BrokerError> {
        match self.pool.get().await {
            Ok(conn) => {
                self.connected.store(true, Ordering::Relaxed);
                Ok(conn)
            }
            Err(e) => {
                self.connected.store(false, Ordering::Relaxed);
                warn!(channel = channel, error = %e, "Redis connection unavailable");
                Err(BrokerError::unavailable(channel))
            }
        }
    }

    /// Round-trip a `PING`.
    pub async fn ping(&self) -> Result<(), BrokerError> {
        let mut conn = self.conn("ping").await?;
        let _: String = cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|_| BrokerError::unavailable("ping"))?;
        Ok(())
    }

    async fn reclaim(
        &self,
        conn: &mut Connection,
        name: &str,
        consumer: &str,
    ) -> Option<Delivery> {
        let min_idle_ms = self.config.visibility_timeout.as_millis() as u64;
        let result: Result<RedisValue, _> = cmd("XAUTOCLAIM")
            .arg(name)
            .arg(&self.config.group)
            .arg(consumer)
            .arg(min_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(1)
            .query_async(conn)
            .await;

        match result {
            Ok(value) => parse_autoclaim(&value).into_iter().next().map(|(id, payload)| {
                info!(queue = name, id = %id, "Reclaimed idle delivery");
                Delivery {
                    queue: name.to_string(),
                    id,
                    payload,
                    redelivered: true,
                }
            }),
            Err(e) => {
                debug!(queue = name, error = %e, "XAUTOCLAIM failed, skipping reclaim");
                None
            }
        }
    }
}

#[async_trait]
impl TopicBroker for RedisBroker {
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<usize, BrokerError> {
        let mut conn = self.conn(channel).await?;
        let receivers: i64 = conn
            .publish(channel, payload.as_ref())
            .await
            .map_err(|e| {
                warn!(channel = channel, error = %e, "PUBLISH failed");
                BrokerError::unavailable(channel)
            })?;
        Ok(usize::try_from(receivers).unwrap_or(0))
    }

    async fn subscribe(&self, channel: &str) -> Result<TopicStream, BrokerError> {
        let mut pubsub = self.client.get_async_pubsub().await.map_err(|e| {
            self.connected.store(false, Ordering::Relaxed);
            warn!(channel = channel, error = %e, "Pub/sub connection failed");
            BrokerError::unavailable(channel)
        })?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|_| BrokerError::unavailable(channel))?;
        self.connected.store(true, Ordering::Relaxed);

        let stream = pubsub
            .into_on_message()
            .map(|msg| Bytes::copy_from_slice(msg.get_payload_bytes()));
        Ok(Box::pin(stream))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl WorkQueue for RedisBroker {
    async fn declare_queue(&self, name: &str, durable: bool) -> Result<(), BrokerError> {
        let mut conn = self.conn(name).await?;
        let created: Result<(), _> = cmd("XGROUP")
            .arg("CREATE")
            .arg(name)
            .arg(&self.config.group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match created {
            Ok(()) => {
                info!(queue = name, durable = durable, "Queue declared");
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(BrokerError::queue(name, e)),
        }
    }

    async fn enqueue(&self, name: &str, payload: Bytes) -> Result<(), BrokerError> {
        let mut conn = self.conn(name).await?;
        let _: String = conn
            .xadd(name, "*", &[(PAYLOAD_FIELD, payload.as_ref())])
            .await
            .map_err(|e| BrokerError::queue(name, e))?;
        Ok(())
    }

    async fn receive(&self, name: &str, consumer: &str) -> Result<Option<Delivery>, BrokerError> {
        let mut conn = self.conn(name).await?;
        if let Some(delivery) = self.reclaim(&mut conn, name, consumer).await {
            return Ok(Some(delivery));
        }

        let opts = StreamReadOptions::default()
            .group(&self.config.group, consumer)
            .block(self.config.block.as_millis() as usize)
            .count(1);
        let reply: StreamReadReply = conn
            .xread_options(&[name], &[">"], &opts)
            .await
            .map_err(|e| BrokerError::queue(name, e))?;

        for key in reply.keys {
            for entry in key.ids {
                match field_bytes(&entry.map, PAYLOAD_FIELD) {
                    Some(payload) => {
                        return Ok(Some(Delivery {
                            queue: name.to_string(),
                            id: entry.id,
                            payload,
                            redelivered: false,
                        }))
                    }
                    None => {
                        warn!(queue = name, id = %entry.id, "Entry without payload, discarding");
                        let _: Result<i64, _> =
                            conn.xack(name, &self.config.group, &[&entry.id]).await;
                    }
                }
            }
        }
        Ok(None)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let mut conn = self.conn(&delivery.queue).await?;
        let acked: i64 = conn
            .xack(&delivery.queue, &self.config.group, &[&delivery.id])
            .await
            .map_err(|e| BrokerError::queue(&delivery.queue, e))?;
        if acked == 0 {
            return Err(BrokerError::UnknownDelivery {
                queue: delivery.queue.clone(),
                id: delivery.id.clone(),
            });
        }
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        // Left pending; XAUTOCLAIM picks it up once idle past the visibility timeout.
        debug!(queue = %delivery.queue, id = %delivery.id, "Delivery nacked");
        Ok(())
    }
}

fn value_bytes(value: &RedisValue) -> Option<Bytes> {
    match value {
        RedisValue::BulkString(bytes) => Some(Bytes::copy_from_slice(bytes)),
        RedisValue::SimpleString(s) => Some(Bytes::copy_from_slice(s.as_bytes())),
        _ => None,
    }
}

fn value_string(value: &RedisValue) -> Option<String> {
    value_bytes(value).map(|b| String::from_utf8_lossy(&b).into_owned())
}

fn field_bytes(map: &HashMap<String, RedisValue>, key: &str) -> Option<Bytes> {
    map.get(key).and_then(value_bytes)
}

/// `XAUTOCLAIM` replies `[next-cursor, [[id, [field, value, ...]], ...], deleted?]`.
fn parse_autoclaim(value: &RedisValue) -> Vec<(String, Bytes)> {
    let RedisValue::Array(parts) = value else {
        return Vec::new();
    };
    let Some(RedisValue::Array(entries)) = parts.get(1) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let RedisValue::Array(pair) = entry else {
                return None;
            };
            let id = value_string(pair.first()?)?;
            let RedisValue::Array(fields) = pair.get(1)? else {
                return None;
            };
            let payload = fields.chunks(2).find_map(|kv| match kv {
                [k, v] if value_string(k).as_deref() == Some(PAYLOAD_FIELD) => value_bytes(v),
                _ => None,
            })?;
            Some((id, payload))
        })
        .collect()
}
