use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};

/// Requests answered by the gateway, by matched route prefix and status
static GATEWAY_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gateway_requests_total",
        "Requests handled by the gateway",
        &["route", "status"]
    )
    .expect("Failed to register gateway_requests_total")
});

/// Route label for requests no rule matched
pub const UNMATCHED_ROUTE: &str = "unmatched";

pub fn record_request(route: &str, status: u16) {
    GATEWAY_REQUESTS_TOTAL
        .with_label_values(&[route, &status.to_string()])
        .inc();
}
