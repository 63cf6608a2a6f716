/// Prometheus metrics for resilience patterns
#[cfg(feature = "metrics")]
use prometheus::{register_int_counter_vec, IntCounterVec};

#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;

#[cfg(feature = "metrics")]
static CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "resilience_calls_total",
        "Outcomes of protected dependency calls",
        &["dependency", "outcome"]
    )
    .expect("Failed to register resilience calls metric")
});

#[cfg(feature = "metrics")]
static TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "resilience_circuit_transitions_total",
        "Circuit breaker state transitions",
        &["dependency", "from", "to"]
    )
    .expect("Failed to register circuit transitions metric")
});

/// Outcome is one of success, failure, timeout, short_circuited, fallback_served
#[cfg(feature = "metrics")]
pub fn record_call(dependency: &str, outcome: &str) {
    CALLS.with_label_values(&[dependency, outcome]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_transition(dependency: &str, from: &str, to: &str) {
    TRANSITIONS.with_label_values(&[dependency, from, to]).inc();
}

#[cfg(not(feature = "metrics"))]
pub fn record_call(_dependency: &str, _outcome: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_transition(_dependency: &str, _from: &str, _to: &str) {}
