//! # Queue Consumption
//!
//! `consume` drives one competing consumer: receive, hand the delivery to a
//! handler, then ack or nack depending on the handler's verdict. A shutdown
//! signal stops the loop between deliveries, never in the middle of one.

use crate::backoff::ExponentialBackoff;
use crate::broker::{Delivery, WorkQueue};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Handler verdict for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Done; remove from the queue.
    Ack,
    /// Failed; redeliver after the visibility timeout.
    Nack,
}

/// Processes deliveries from a work queue.
#[async_trait]
pub trait QueueHandler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> Ack;
}

/// Run a consumer until `shutdown` flips to `true`.
///
/// Returns the number of deliveries handled.
pub async fn consume<Q, H>(
    queue: Arc<Q>,
    name: &str,
    consumer: &str,
    handler: Arc<H>,
    mut shutdown: watch::Receiver<bool>,
) -> u64
where
    Q: WorkQueue + ?Sized,
    H: QueueHandler + ?Sized,
{
    let mut backoff = ExponentialBackoff::default();
    let mut handled = 0u64;
    info!(queue = name, consumer = consumer, "Queue consumer started");

    loop {
        if *shutdown.borrow() {
            break;
        }
        let next = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            next = queue.receive(name, consumer) => next,
        };

        match next {
            Ok(Some(delivery)) => {
                backoff.reset();
                let verdict = handler.handle(&delivery).await;
                let settled = match verdict {
                    Ack::Ack => queue.ack(&delivery).await,
                    Ack::Nack => queue.nack(&delivery).await,
                };
                if let Err(e) = settled {
                    warn!(queue = name, id = %delivery.id, error = %e, "Failed to settle delivery");
                }
                handled += 1;
                debug!(queue = name, id = %delivery.id, verdict = ?verdict, "Delivery settled");
            }
            Ok(None) => {}
            Err(e) => {
                let delay = backoff.next_delay();
                warn!(
                    queue = name,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Queue receive failed"
                );
                tokio::select! {
                    _ = shutdown.changed() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    info!(queue = name, consumer = consumer, handled = handled, "Queue consumer stopped");
    handled
}
