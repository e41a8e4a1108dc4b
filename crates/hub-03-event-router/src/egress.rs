//! Per-stream egress task: handshake, gap marker, replay, then live events
//! with idle keep-alives, until the client goes away or the process stops.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::convert::Infallible;
use std::fmt::Write as _;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::domain::{ConnectionState, Gap, Lifecycle, SequencedEvent};
use crate::registry::ConnectionId;
use crate::router::Subscription;

/// Upper bound on writing the terminal frame to a client that may not be reading.
const SHUTDOWN_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// One `text/event-stream` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

impl SseFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }

    #[must_use]
    pub fn connection_established(connection_id: ConnectionId, at: DateTime<Utc>) -> Self {
        let data = json!({
            "connection_id": connection_id.to_string(),
            "timestamp": at.to_rfc3339(),
        });
        Self::new("connection_established", data.to_string())
    }

    #[must_use]
    pub fn keep_alive() -> Self {
        Self::new("keep-alive", "ping")
    }

    #[must_use]
    pub fn gap(gap: &Gap) -> Self {
        let data = json!({ "since_seq": gap.since_seq, "oldest_seq": gap.oldest_seq });
        Self::new("gap", data.to_string())
    }

    #[must_use]
    pub fn shutdown() -> Self {
        Self::new("shutdown", json!({ "reason": "shutdown" }).to_string())
    }

    pub fn from_event(event: &SequencedEvent) -> Result<Self, serde_json::Error> {
        Ok(Self::new(event.event_type(), event.to_wire_json()?))
    }

    /// Wire encoding. Multi-line data becomes one `data:` line per line.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = String::with_capacity(self.event.len() + self.data.len() + 16);
        let _ = writeln!(out, "event: {}", self.event);
        for line in self.data.split('\n') {
            let _ = writeln!(out, "data: {line}");
        }
        out.push('\n');
        Bytes::from(out)
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("client disconnected")]
    Closed,

    #[error("write failed: {0}")]
    Write(String),
}

/// Where a stream's frames go. Each write is flushed before returning.
#[async_trait]
pub trait EventSink: Send {
    async fn send(&mut self, frame: SseFrame) -> Result<(), SinkError>;
}

/// Sink feeding an HTTP response body stream.
pub struct ChannelSink {
    tx: mpsc::Sender<Result<Bytes, Infallible>>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(tx: mpsc::Sender<Result<Bytes, Infallible>>) -> Self {
        Self { tx }
    }

    /// A sink and the body stream it writes into.
    #[must_use]
    pub fn pair(capacity: usize) -> (Self, ReceiverStream<Result<Bytes, Infallible>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), ReceiverStream::new(rx))
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&mut self, frame: SseFrame) -> Result<(), SinkError> {
        self.tx
            .send(Ok(frame.encode()))
            .await
            .map_err(|_| SinkError::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Write failed or the client went away.
    SinkClosed,
    Shutdown,
    /// The router dropped the mailbox sender.
    RouterClosed,
}

impl CloseReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SinkClosed => "sink_closed",
            Self::Shutdown => "shutdown",
            Self::RouterClosed => "router_closed",
        }
    }
}

/// Drive one stream to completion. The subscription is dropped (and so
/// unregistered) when this returns.
pub async fn run_egress<S: EventSink>(
    mut subscription: Subscription,
    mut sink: S,
    keepalive: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> CloseReason {
    let connection_id = subscription.connection_id();
    let mut lifecycle = Lifecycle::new();

    let reason = match stream(
        &mut subscription,
        &mut sink,
        keepalive,
        &mut shutdown,
        &mut lifecycle,
    )
    .await
    {
        Ok(()) => CloseReason::RouterClosed,
        Err(reason) => reason,
    };

    if reason == CloseReason::Shutdown {
        let _ = tokio::time::timeout(SHUTDOWN_WRITE_TIMEOUT, sink.send(SseFrame::shutdown())).await;
    }
    transition(&mut lifecycle, ConnectionState::Closed, connection_id);

    info!(
        connection_id = %connection_id,
        tenant_id = %subscription.tenant_id(),
        reason = reason.as_str(),
        dropped = subscription.dropped(),
        "Stream closed"
    );
    reason
}

async fn stream<S: EventSink>(
    subscription: &mut Subscription,
    sink: &mut S,
    keepalive: Duration,
    shutdown: &mut watch::Receiver<bool>,
    lifecycle: &mut Lifecycle,
) -> Result<(), CloseReason> {
    let connection_id = subscription.connection_id();
    write(sink, SseFrame::connection_established(connection_id, Utc::now()), shutdown).await?;

    transition(lifecycle, ConnectionState::Replaying, connection_id);
    if let Some(gap) = subscription.gap {
        write(sink, SseFrame::gap(&gap), shutdown).await?;
    }
    let replay = std::mem::take(&mut subscription.replay);
    debug!(connection_id = %connection_id, replayed = replay.len(), "Replaying buffered events");
    for event in replay {
        if let Some(frame) = event_frame(&event) {
            write(sink, frame, shutdown).await?;
        }
    }

    transition(lifecycle, ConnectionState::Live, connection_id);
    loop {
        tokio::select! {
            biased;
            () = signalled(shutdown) => return Err(CloseReason::Shutdown),
            next = tokio::time::timeout(keepalive, subscription.next_live()) => {
                let frame = match next {
                    Ok(Some(event)) => match event_frame(&event) {
                        Some(frame) => frame,
                        None => continue,
                    },
                    Ok(None) => return Ok(()),
                    Err(_) => SseFrame::keep_alive(),
                };
                write(sink, frame, shutdown).await?;
            }
        }
    }
}

async fn write<S: EventSink>(
    sink: &mut S,
    frame: SseFrame,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), CloseReason> {
    tokio::select! {
        biased;
        () = signalled(shutdown) => Err(CloseReason::Shutdown),
        result = sink.send(frame) => result.map_err(|e| {
            debug!(error = %e, "Stream write failed");
            CloseReason::SinkClosed
        }),
    }
}

/// Resolves once shutdown is requested or its sender is gone.
async fn signalled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn event_frame(event: &SequencedEvent) -> Option<SseFrame> {
    match SseFrame::from_event(event) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(seq = event.seq, error = %e, "Event not serializable, skipped");
            None
        }
    }
}

fn transition(lifecycle: &mut Lifecycle, next: ConnectionState, connection_id: ConnectionId) {
    if let Err(e) = lifecycle.advance(next) {
        warn!(connection_id = %connection_id, error = %e, "Unexpected stream transition");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::EventRouter;
    use crate::{RouterConfig, StreamRequest};
    use async_trait::async_trait;
    use hub_02_subscription_policy::{EventMeta, NotificationPolicy};
    use shared_types::{DomainEvent, EventFamily, EventType, JsonMap, TenantId};
    use std::sync::Arc;
    use tokio_stream::StreamExt;

    struct AllowAll;

    #[async_trait]
    impl NotificationPolicy for AllowAll {
        async fn should_notify(&self, _: TenantId, _: &str, _: &EventMeta) -> bool {
            true
        }
    }

    fn router() -> EventRouter {
        EventRouter::new(RouterConfig::default(), Arc::new(AllowAll))
    }

    fn paid(tenant: u64) -> DomainEvent {
        DomainEvent::new(EventType::new(EventFamily::Order, "paid").unwrap(), JsonMap::new())
            .with_tenant(TenantId(tenant))
    }

    async fn next_frame(body: &mut ReceiverStream<Result<Bytes, Infallible>>) -> String {
        let chunk = tokio::time::timeout(Duration::from_secs(1), body.next())
            .await
            .expect("timed out")
            .expect("body ended")
            .unwrap();
        String::from_utf8(chunk.to_vec()).unwrap()
    }

    #[test]
    fn test_frame_encoding() {
        assert_eq!(
            SseFrame::keep_alive().encode(),
            Bytes::from_static(b"event: keep-alive\ndata: ping\n\n")
        );
        assert_eq!(
            SseFrame::new("x", "a\nb").encode(),
            Bytes::from_static(b"event: x\ndata: a\ndata: b\n\n")
        );
    }

    #[tokio::test]
    async fn test_handshake_gap_replay_then_live() {
        let router = EventRouter::new(
            RouterConfig {
                ring_size: 2,
                ..RouterConfig::default()
            },
            Arc::new(AllowAll),
        );
        for _ in 0..4 {
            router.publish(paid(1), false);
        }
        let subscription = router.open_stream(StreamRequest {
            tenant_id: TenantId(1),
            filter: Default::default(),
            since_seq: Some(1),
        });
        let (sink, mut body) = ChannelSink::pair(16);
        let (_stop, shutdown) = watch::channel(false);
        let task = tokio::spawn(run_egress(subscription, sink, Duration::from_secs(30), shutdown));

        assert!(next_frame(&mut body).await.starts_with("event: connection_established\n"));
        let gap = next_frame(&mut body).await;
        assert!(gap.starts_with("event: gap\n"));
        assert!(gap.contains("\"oldest_seq\":3"));
        assert!(next_frame(&mut body).await.contains("\"seq\":3"));
        assert!(next_frame(&mut body).await.contains("\"seq\":4"));

        router.publish(paid(1), false);
        let live = next_frame(&mut body).await;
        assert!(live.starts_with("event: order.paid\n"));
        assert!(live.contains("\"seq\":5"));

        drop(body);
        router.publish(paid(1), false);
        let reason = tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert_eq!(reason, CloseReason::SinkClosed);
        assert_eq!(router.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_keep_alive_when_idle() {
        let router = router();
        let subscription = router.open_stream(StreamRequest::default());
        let (sink, mut body) = ChannelSink::pair(16);
        let (_stop, shutdown) = watch::channel(false);
        tokio::spawn(run_egress(subscription, sink, Duration::from_millis(20), shutdown));

        next_frame(&mut body).await;
        assert_eq!(next_frame(&mut body).await, "event: keep-alive\ndata: ping\n\n");
    }

    #[tokio::test]
    async fn test_shutdown_writes_terminal_frame() {
        let router = router();
        let subscription = router.open_stream(StreamRequest::default());
        let (sink, mut body) = ChannelSink::pair(16);
        let (stop, shutdown) = watch::channel(false);
        let task = tokio::spawn(run_egress(subscription, sink, Duration::from_secs(30), shutdown));

        next_frame(&mut body).await;
        stop.send(true).unwrap();
        assert!(next_frame(&mut body).await.starts_with("event: shutdown\n"));

        let reason = tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert_eq!(reason, CloseReason::Shutdown);
        assert_eq!(router.subscriber_count(), 0);
    }
}
