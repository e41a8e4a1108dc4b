//! Producer side of the request/reply exchange.
//!
//! `submit` registers the correlation id before enqueueing, so a response
//! can never arrive ahead of its waiter. Listeners on each provider's
//! response channel hand responses to the pending table; nothing else
//! consumes them.

use bytes::Bytes;
use serde_json::Value;
use shared_bus::{Broker, ProviderFamily, ResilientSubscription, WorkQueue};
use shared_types::{CorrelationId, InvoiceRequest, InvoiceResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{cleanup_task, synthetic_audit, CoordinatorError, PendingRequestStore};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(5);

pub struct InvoiceClient {
    broker: Arc<dyn Broker>,
    pending: Arc<PendingRequestStore>,
    family: ProviderFamily,
    shutdown: watch::Receiver<bool>,
}

impl InvoiceClient {
    /// Subscribe to the response channel of every provider in `providers`
    /// and start the listeners plus the expiry sweep. Subscriptions are
    /// open when this returns.
    pub async fn start(
        broker: Arc<dyn Broker>,
        providers: &[String],
        timeout: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> (Arc<Self>, Vec<JoinHandle<()>>) {
        let family = ProviderFamily::Invoicing;
        let pending = Arc::new(PendingRequestStore::new(timeout));
        let mut handles = Vec::with_capacity(providers.len() + 1);

        for provider in providers {
            let channel = family.response_channel(provider);
            let subscription = ResilientSubscription::open(broker.clone(), channel).await;
            handles.push(tokio::spawn(listen(subscription, pending.clone(), shutdown.clone())));
        }
        handles.push(tokio::spawn(cleanup_task(
            pending.clone(),
            CLEANUP_INTERVAL.min(timeout),
            shutdown.clone(),
        )));
        info!(providers = ?providers, timeout_ms = timeout.as_millis() as u64, "Invoice client started");

        let client = Arc::new(Self {
            broker,
            pending,
            family,
            shutdown,
        });
        (client, handles)
    }

    #[must_use]
    pub fn pending(&self) -> &Arc<PendingRequestStore> {
        &self.pending
    }

    /// Enqueue `request` on its provider's queue and wait for the matching
    /// response. A request left unanswered past the timeout resolves to a
    /// `timeout` error response.
    pub async fn submit(&self, mut request: InvoiceRequest) -> Result<InvoiceResponse, CoordinatorError> {
        if *self.shutdown.borrow() {
            return Err(CoordinatorError::ShuttingDown);
        }
        if request.correlation_id.is_empty() {
            request.correlation_id = CorrelationId::new();
        }
        let correlation_id = request.correlation_id.clone();
        let queue = self.family.request_queue(&request.provider);
        let payload = serde_json::to_vec(&request).map_err(|e| CoordinatorError::MalformedRequest(e.to_string()))?;

        let waiter = self
            .pending
            .register(correlation_id.clone(), request.invoice_id, &request.provider, None);
        if let Err(e) = self.broker.enqueue(&queue, Bytes::from(payload.clone())).await {
            self.pending.cancel(&correlation_id);
            return Err(e.into());
        }
        debug!(correlation_id = %correlation_id, queue = %queue, "Invoice request enqueued");

        let timeout = self.pending.default_timeout();
        match tokio::time::timeout(timeout, waiter).await {
            Ok(Ok(response)) => Ok(response),
            // Sender dropped by the expiry sweep, or the wait ran out.
            Ok(Err(_)) | Err(_) => {
                self.pending.cancel(&correlation_id);
                warn!(correlation_id = %correlation_id, queue = %queue, "Invoice request timed out");
                Ok(timed_out(&request, &queue, &payload, timeout))
            }
        }
    }
}

fn timed_out(request: &InvoiceRequest, queue: &str, payload: &[u8], timeout: Duration) -> InvoiceResponse {
    let error = CoordinatorError::Timeout(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
    let audit = synthetic_audit(
        format!("queue://{queue}"),
        String::from_utf8_lossy(payload).into_owned(),
        &error,
    );
    InvoiceResponse::failure(
        request.invoice_id,
        &request.provider,
        request.correlation_id.clone(),
        error.error_code(),
        error.to_string(),
        audit,
    )
}

async fn listen(
    mut subscription: ResilientSubscription<dyn Broker>,
    pending: Arc<PendingRequestStore>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let payload = tokio::select! {
            biased;
            () = stopped(&mut shutdown) => break,
            payload = subscription.recv() => payload,
        };
        match serde_json::from_slice::<InvoiceResponse>(&payload) {
            Ok(response) => {
                pending.complete(response);
            }
            Err(e) => {
                let correlation_id = serde_json::from_slice::<Value>(&payload)
                    .ok()
                    .and_then(|v| v["correlation_id"].as_str().map(str::to_string));
                warn!(
                    channel = subscription.channel(),
                    correlation_id = ?correlation_id,
                    error = %e,
                    "Unreadable invoice response"
                );
            }
        }
    }
    debug!(channel = subscription.channel(), "Response listener stopped");
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
