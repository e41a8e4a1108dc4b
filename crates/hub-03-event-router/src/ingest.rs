//! Broker ingest: one task per state topic feeding the router.

use hub_telemetry::metrics::BROKER_RECONNECTS;
use shared_bus::{ChannelNames, ResilientSubscription, TopicBroker};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::router::EventRouter;

/// Subscribe to every state topic, then spawn one ingest loop per topic.
///
/// Returns once all subscriptions are live, so events published after this
/// call are never missed. Loops end when `shutdown` flips to `true`.
pub async fn start_ingest<B>(
    router: Arc<EventRouter>,
    broker: Arc<B>,
    channels: &ChannelNames,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>>
where
    B: TopicBroker + ?Sized + 'static,
{
    let mut subscriptions = Vec::new();
    for (kind, channel) in channels.all_state() {
        let subscription = ResilientSubscription::open(broker.clone(), channel).await;
        subscriptions.push((kind.label(), subscription));
    }

    subscriptions
        .into_iter()
        .map(|(label, subscription)| {
            tokio::spawn(ingest_loop(
                router.clone(),
                label,
                subscription,
                shutdown.clone(),
            ))
        })
        .collect()
}

async fn ingest_loop<B>(
    router: Arc<EventRouter>,
    label: &'static str,
    mut subscription: ResilientSubscription<B>,
    mut shutdown: watch::Receiver<bool>,
) where
    B: TopicBroker + ?Sized,
{
    info!(channel = %subscription.channel(), "Ingest loop started");
    let mut reconnects = 0;

    loop {
        let payload = tokio::select! {
            biased;
            () = stopped(&mut shutdown) => break,
            payload = subscription.recv() => payload,
        };

        if subscription.reconnects() > reconnects {
            BROKER_RECONNECTS
                .with_label_values(&[label])
                .inc_by(subscription.reconnects() - reconnects);
            reconnects = subscription.reconnects();
        }

        match router.ingest(label, &payload).await {
            Ok(outcome) => debug!(channel = label, seq = outcome.seq(), "Event ingested"),
            Err(e) => warn!(
                channel = label,
                reason = e.drop_reason(),
                error = %e,
                "Event dropped"
            ),
        }
    }

    info!(channel = %subscription.channel(), "Ingest loop stopped");
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
