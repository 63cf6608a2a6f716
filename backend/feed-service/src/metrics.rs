use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};

static AGGREGATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_aggregations_total",
        "Feed requests by how they were answered",
        &["feed", "result"]
    )
    .expect("Failed to register feed aggregations metric")
});

/// `result` is one of cache_hit, aggregated, degraded, failed
pub fn record_aggregation(feed: &str, result: &str) {
    AGGREGATIONS.with_label_values(&[feed, result]).inc();
}
