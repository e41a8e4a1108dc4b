//! # Hub Wiring
//!
//! Builds every component from a validated [`HubConfig`] and owns the tasks
//! they run.
//!
//! ## Startup Sequence
//!
//! 1. Pick adapters from the URL schemes (broker, L2 cache, store of record)
//! 2. Build CIC and SPS over those adapters
//! 3. Build the router and open its broker subscriptions
//! 4. Open the producer client's response subscriptions
//! 5. Declare request queues and start the provider workers
//!
//! ## Shutdown Sequence
//!
//! 1. Flip the shutdown signal: streams write their terminal frame, ingest
//!    loops and workers stop between deliveries
//! 2. Wait for tasks up to the grace window, then abort the stragglers

use anyhow::{bail, Context, Result};
use hub_01_credential_cache::{
    CacheConfig, CredentialCacheService, InMemoryIntegrationStore, InMemorySharedCache, IntegrationStore,
    SharedCache,
};
use hub_02_subscription_policy::{InMemoryRuleStore, RuleStore, SubscriptionPolicyService};
use hub_03_event_router::{http_router, start_ingest, EventRouter, HttpState};
use hub_04_invoice_coordinator::{provider_for, InvoiceClient, InvoiceWorker};
use shared_bus::{Broker, ChannelNames, InMemoryBroker};
use shared_crypto::{CredentialCipher, MasterKey};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{backend, Backend, HubConfig};

/// A running hub: components plus the tasks driving them.
pub struct Hub {
    config: HubConfig,
    channels: ChannelNames,
    broker: Arc<dyn Broker>,
    credentials: Arc<CredentialCacheService>,
    policy: Arc<SubscriptionPolicyService>,
    router: Arc<EventRouter>,
    client: Arc<InvoiceClient>,
    tasks: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Hub {
    /// Validate `config`, connect the adapters it names and start every
    /// background task.
    pub async fn start(config: HubConfig) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let broker = connect_broker(&config).await?;
        Self::start_with_broker(config, broker).await
    }

    /// Same as [`Hub::start`] over an already connected broker.
    pub async fn start_with_broker(config: HubConfig, broker: Arc<dyn Broker>) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let channels = ChannelNames::new(config.broker.channel_prefix.clone());
        let mut tasks = Vec::new();

        let (integrations, rules) = connect_store(&config).await?;
        let shared = connect_shared_cache(&config)?;
        let cipher = Arc::new(CredentialCipher::new(master_key(&config)?));
        let credentials = Arc::new(CredentialCacheService::new(
            integrations,
            shared,
            cipher,
            CacheConfig::default(),
        ));
        let policy = Arc::new(SubscriptionPolicyService::new(rules, config.store.policy_ttl()));

        let router = Arc::new(EventRouter::new(config.router.clone(), policy.clone()));
        tasks.extend(start_ingest(router.clone(), broker.clone(), &channels, shutdown_rx.clone()).await);

        let invoicing = &config.coordinator;
        let (client, client_tasks) = InvoiceClient::start(
            broker.clone(),
            &invoicing.providers,
            invoicing.coordinator.request_deadline(),
            shutdown_rx.clone(),
        )
        .await;
        tasks.extend(client_tasks);

        for code in &invoicing.providers {
            let provider = provider_for(code, &invoicing.coordinator)
                .with_context(|| format!("invoice provider '{code}'"))?;
            let worker = Arc::new(InvoiceWorker::new(
                provider,
                credentials.clone(),
                broker.clone(),
                channels.clone(),
            ));
            for index in 0..invoicing.workers_per_provider {
                let consumer = format!("{code}-{index}");
                let worker = worker.clone();
                let shutdown = shutdown_rx.clone();
                tasks.push(tokio::spawn(async move {
                    match worker.run(&consumer, shutdown).await {
                        Ok(handled) => info!(consumer = %consumer, handled, "Invoice worker stopped"),
                        Err(e) => warn!(consumer = %consumer, error = %e, "Invoice worker failed"),
                    }
                }));
            }
        }

        info!(
            broker = %redact(&config.broker.url),
            store = %redact(&config.store.url),
            providers = ?invoicing.providers,
            tasks = tasks.len(),
            "Hub started"
        );

        Ok(Self {
            config,
            channels,
            broker,
            credentials,
            policy,
            router,
            client,
            tasks,
            shutdown_tx,
            shutdown_rx,
        })
    }

    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    #[must_use]
    pub fn channels(&self) -> &ChannelNames {
        &self.channels
    }

    #[must_use]
    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    #[must_use]
    pub fn credentials(&self) -> &Arc<CredentialCacheService> {
        &self.credentials
    }

    #[must_use]
    pub fn policy(&self) -> &Arc<SubscriptionPolicyService> {
        &self.policy
    }

    #[must_use]
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    #[must_use]
    pub fn client(&self) -> &Arc<InvoiceClient> {
        &self.client
    }

    /// HTTP surface: streams, health and metrics.
    #[must_use]
    pub fn http(&self) -> axum::Router {
        http_router(HttpState {
            router: self.router.clone(),
            keepalive: self.config.router.keepalive(),
            superuser_token: self.config.server.superuser_token.clone(),
            shutdown: self.shutdown_rx.clone(),
        })
    }

    /// Serve HTTP on `listener` until `signal` resolves, then shut down.
    pub async fn serve<S>(self, listener: TcpListener, signal: S) -> Result<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr().context("listener address")?;
        info!(addr = %addr, "Streaming endpoint listening");

        let app = self.http();
        let trigger = self.shutdown_tx.clone();
        let mut drained = self.shutdown_rx.clone();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    tokio::select! {
                        () = signal => {
                            info!("Shutdown signal received");
                            let _ = trigger.send(true);
                        }
                        () = stopped(&mut drained) => {}
                    }
                })
                .await
        });

        let grace = self.config.server.shutdown_grace();
        stopped(&mut self.shutdown_rx.clone()).await;
        match tokio::time::timeout(grace, server).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!(error = %e, "HTTP server error"),
            Ok(Err(e)) => warn!(error = %e, "HTTP server task failed"),
            Err(_) => warn!(grace_secs = grace.as_secs(), "HTTP server did not drain in time"),
        }
        self.shutdown().await;
        Ok(())
    }

    /// Signal every task to stop and wait for them within the grace window.
    pub async fn shutdown(self) {
        info!("Initiating graceful shutdown...");
        let _ = self.shutdown_tx.send(true);

        let deadline = tokio::time::Instant::now() + self.config.server.shutdown_grace();
        let mut aborted = 0usize;
        for mut task in self.tasks {
            if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
                task.abort();
                aborted += 1;
            }
        }
        if aborted > 0 {
            warn!(aborted, "Tasks aborted after grace window");
        }
        info!("Shutdown complete");
    }

    /// Trigger shutdown from outside `serve`.
    #[must_use]
    pub fn shutdown_trigger(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn connect_broker(config: &HubConfig) -> Result<Arc<dyn Broker>> {
    let url = &config.broker.url;
    match backend("BROKER_URL", url, &[Backend::Memory, Backend::Redis])? {
        Backend::Memory => Ok(Arc::new(InMemoryBroker::new())),
        #[cfg(feature = "redis")]
        Backend::Redis => {
            let broker = shared_bus::RedisBroker::connect(shared_bus::RedisBrokerConfig::new(url.clone()))?;
            broker.ping().await.context("broker not reachable")?;
            Ok(Arc::new(broker))
        }
        other => bail!("{other:?} broker support is not compiled in"),
    }
}

async fn connect_store(config: &HubConfig) -> Result<(Arc<dyn IntegrationStore>, Arc<dyn RuleStore>)> {
    let url = &config.store.url;
    match backend("STORE_URL", url, &[Backend::Memory, Backend::Postgres])? {
        Backend::Memory => Ok((
            Arc::new(InMemoryIntegrationStore::new()),
            Arc::new(InMemoryRuleStore::new()),
        )),
        #[cfg(feature = "postgres")]
        Backend::Postgres => {
            let integrations =
                hub_01_credential_cache::PgIntegrationStore::connect(url, config.store.max_connections).await?;
            integrations.run_migrations().await?;
            let rules = hub_02_subscription_policy::PgRuleStore::new(integrations.pool().clone());
            rules.run_migrations().await?;
            Ok((Arc::new(integrations), Arc::new(rules)))
        }
        other => bail!("{other:?} store support is not compiled in"),
    }
}

fn connect_shared_cache(config: &HubConfig) -> Result<Arc<dyn SharedCache>> {
    let url = &config.cache.url;
    match backend("CACHE_URL", url, &[Backend::Memory, Backend::Redis])? {
        Backend::Memory => Ok(Arc::new(InMemorySharedCache::new())),
        #[cfg(feature = "redis")]
        Backend::Redis => Ok(Arc::new(hub_01_credential_cache::RedisSharedCache::connect(url)?)),
        other => bail!("{other:?} cache support is not compiled in"),
    }
}

/// Credentials written under a throwaway key are unreadable after a
/// restart, so a persistent store requires `MASTER_KEY`.
fn master_key(config: &HubConfig) -> Result<MasterKey> {
    match &config.cache.master_key {
        Some(hex) => MasterKey::from_hex(hex).context("MASTER_KEY"),
        None if config.store.url.starts_with(crate::config::MEMORY_URL) => {
            warn!("MASTER_KEY not set, using an ephemeral key");
            Ok(MasterKey::generate())
        }
        None => bail!("MASTER_KEY is required with a persistent store"),
    }
}

/// Drop credentials from a connection URL before logging it.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => format!("{}://***{}", &url[..scheme], &url[at..]),
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use std::time::Duration;

    #[test]
    fn test_redact() {
        assert_eq!(redact("postgres://hub:pw@db:5432/hub"), "postgres://***@db:5432/hub");
        assert_eq!(redact("memory://"), "memory://");
        assert_eq!(redact("redis://cache:6379"), "redis://cache:6379");
    }

    #[test]
    fn test_persistent_store_needs_master_key() {
        let mut config = HubConfig::default();
        assert!(master_key(&config).is_ok());
        config.store.url = "postgres://db/hub".into();
        assert!(master_key(&config).is_err());
        config.cache.master_key = Some("11".repeat(32));
        assert!(master_key(&config).is_ok());
    }

    #[tokio::test]
    async fn test_memory_hub_starts_and_stops() {
        let hub = Hub::start(HubConfig::default()).await.unwrap();
        assert_eq!(hub.router().subscriber_count(), 0);
        assert_eq!(hub.channels().orders(), "hub:orders:state:events");
        let trigger = hub.shutdown_trigger();
        tokio::time::timeout(Duration::from_secs(5), async move {
            trigger.send(true).unwrap();
            hub.shutdown().await;
        })
        .await
        .unwrap();
    }
}
