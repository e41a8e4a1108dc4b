//! Prometheus metrics for the hub.
//!
//! Naming convention: `hub_<area>_<metric>_<unit>`.

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // EVENT ROUTER
    // =========================================================================

    /// Events accepted from a state channel
    pub static ref EVENTS_INGESTED: IntCounterVec = IntCounterVec::new(
        Opts::new("hub_events_ingested_total", "Events accepted from broker state channels"),
        &["channel"]
    ).expect("metric creation failed");

    /// Events discarded before distribution
    pub static ref EVENTS_DROPPED: IntCounterVec = IntCounterVec::new(
        Opts::new("hub_events_dropped_total", "Events discarded before distribution"),
        &["reason"]  // reason: malformed/unknown_type
    ).expect("metric creation failed");

    /// Events a subscription rule told us not to announce
    pub static ref EVENTS_SUPPRESSED: IntCounter = IntCounter::new(
        "hub_events_suppressed_total",
        "Events suppressed by subscription policy"
    ).expect("metric creation failed");

    /// Events dropped because a subscriber mailbox was full
    pub static ref SLOW_CONSUMER_DROPS: IntCounter = IntCounter::new(
        "hub_slow_consumer_drops_total",
        "Events dropped for slow stream consumers"
    ).expect("metric creation failed");

    /// Open event streams
    pub static ref STREAM_SUBSCRIBERS: IntGauge = IntGauge::new(
        "hub_stream_subscribers",
        "Number of open event streams"
    ).expect("metric creation failed");

    /// Events pushed out of a full ring buffer
    pub static ref RING_BUFFER_EVICTIONS: IntCounter = IntCounter::new(
        "hub_ring_buffer_evictions_total",
        "Events evicted from replay buffers"
    ).expect("metric creation failed");

    // =========================================================================
    // INVOICE COORDINATOR
    // =========================================================================

    /// Invoice requests processed, by outcome
    pub static ref INVOICE_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("hub_invoice_requests_total", "Invoice requests processed"),
        &["provider", "status"]  // status: success/error
    ).expect("metric creation failed");

    /// End-to-end processing time of one request
    pub static ref INVOICE_PROCESSING_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "hub_invoice_processing_seconds",
            "Time from request receipt to published response"
        ).buckets(exponential_buckets(0.005, 2.0, 14).unwrap_or_default()),
        &["provider"]
    ).expect("metric creation failed");

    // =========================================================================
    // CACHES
    // =========================================================================

    /// Lookups by cache and the layer that answered
    pub static ref CACHE_LOOKUPS: IntCounterVec = IntCounterVec::new(
        Opts::new("hub_cache_lookups_total", "Cache lookups by answering layer"),
        &["cache", "layer"]  // layer: l1/l2/l3/miss
    ).expect("metric creation failed");

    // =========================================================================
    // BROKER
    // =========================================================================

    /// Broker reconnects after a lost subscription
    pub static ref BROKER_RECONNECTS: IntCounterVec = IntCounterVec::new(
        Opts::new("hub_broker_reconnects_total", "Broker subscription reconnects"),
        &["channel"]
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; already-registered collectors are skipped.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Router
        Box::new(EVENTS_INGESTED.clone()),
        Box::new(EVENTS_DROPPED.clone()),
        Box::new(EVENTS_SUPPRESSED.clone()),
        Box::new(SLOW_CONSUMER_DROPS.clone()),
        Box::new(STREAM_SUBSCRIBERS.clone()),
        Box::new(RING_BUFFER_EVICTIONS.clone()),
        // Invoicing
        Box::new(INVOICE_REQUESTS.clone()),
        Box::new(INVOICE_PROCESSING_SECONDS.clone()),
        // Caches
        Box::new(CACHE_LOOKUPS.clone()),
        // Broker
        Box::new(BROKER_RECONNECTS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
