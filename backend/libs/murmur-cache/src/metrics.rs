//! Cache metrics for observability

use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

static OPERATIONS: OnceLock<IntCounterVec> = OnceLock::new();

fn operations() -> &'static IntCounterVec {
    OPERATIONS.get_or_init(|| {
        IntCounterVec::new(
            Opts::new("cache_operations_total", "Cache operations by outcome"),
            &["backend", "op", "result"],
        )
        .expect("valid metric definition")
    })
}

/// Cache metrics wrapper, labelled by backend
#[derive(Clone, Copy, Debug)]
pub struct CacheMetrics {
    backend: &'static str,
}

impl CacheMetrics {
    pub fn new(backend: &'static str) -> Self {
        Self { backend }
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(operations().clone()))
    }

    pub fn record_hit(&self) {
        self.record("get", "hit", 1);
    }

    pub fn record_miss(&self) {
        self.record("get", "miss", 1);
    }

    pub fn record_expired(&self, count: usize) {
        self.record("expire", "removed", count as u64);
    }

    pub fn record_write(&self) {
        self.record("put", "ok", 1);
    }

    pub fn record_invalidation(&self, count: usize) {
        self.record("invalidate", "removed", count as u64);
    }

    pub fn record_error(&self, op: &'static str) {
        self.record(op, "error", 1);
    }

    fn record(&self, op: &str, result: &str, by: u64) {
        if by > 0 {
            operations()
                .with_label_values(&[self.backend, op, result])
                .inc_by(by);
        }
    }
}
