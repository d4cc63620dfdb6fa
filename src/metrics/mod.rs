//! Prometheus collectors for topology and streaming activity.
//!
//! The crate only records; exposing [`gather_text`] over HTTP is up to the
//! embedding application.


use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::error;

pub(crate) const OUTCOME_OK: &str = "ok";
pub(crate) const OUTCOME_ERROR: &str = "error";

lazy_static! {
    pub static ref TOPOLOGY_REFRESH_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("vbucket_topology_refresh_total", "Bucket topology refreshes by outcome"),
        &["bucket", "outcome"]
    )
    .expect("metric can not be created");

    pub static ref NODE_POOLS_OPENED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("vbucket_node_pools_opened_total", "Node connection pools opened"),
        &["bucket"]
    )
    .expect("metric can not be created");

    pub static ref NODE_POOLS_CLOSED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("vbucket_node_pools_closed_total", "Node connection pools closed"),
        &["bucket"]
    )
    .expect("metric can not be created");

    pub static ref STREAM_RECONNECTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("vbucket_stream_reconnects_total", "Mutation stream recovery cycles"),
        &["bucket"]
    )
    .expect("metric can not be created");

    pub static ref STREAM_EVENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("vbucket_stream_events_total", "Mutation events forwarded per node"),
        &["node"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        register_custom_metrics(&registry);
        registry
    };
}

pub fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(TOPOLOGY_REFRESH_TOTAL.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(NODE_POOLS_OPENED_TOTAL.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(NODE_POOLS_CLOSED_TOTAL.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(STREAM_RECONNECTS_TOTAL.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(STREAM_EVENTS_TOTAL.clone()))
        .expect("collector can be registered");
}

/// Renders every collector in the Prometheus text exposition format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        error!("metrics are not valid utf-8: {e}");
        String::new()
    })
}
