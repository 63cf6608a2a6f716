/// Resilience patterns for Murmur's outbound calls
///
/// Every call a Murmur service makes to a registered dependency goes
/// through a `ResilientCall`:
/// - **Circuit Breaker**: per dependency, opens after N failures in a sliding window
/// - **Timeout**: a deadline per attempt; expiry counts as a failure
/// - **Retry**: one retry with backoff for idempotent reads only
/// - **Fallback**: optional degraded value, logged as a distinct outcome
///
/// # Example: identity lookup with a fallback
///
/// ```rust,no_run
/// use resilience::{presets, CallKind, ResilientCall};
///
/// #[tokio::main]
/// async fn main() {
///     let identity = ResilientCall::new("identity-service", presets::identity_service_config());
///
///     let served = identity
///         .call_with_fallback(
///             CallKind::IdempotentRead,
///             || async { Ok::<_, String>(vec!["alice".to_string()]) },
///             Vec::new,
///         )
///         .await;
///
///     println!("degraded: {}", served.is_fallback());
/// }
/// ```

pub mod breakers;
pub mod call;
pub mod circuit_breaker;
pub mod metrics;
pub mod presets;
pub mod retry;
pub mod timeout;

// Re-export main types for convenience
pub use breakers::ResilienceRegistry;
pub use call::{CallError, FallbackCause, ResilientCall, Served};
pub use circuit_breaker::{
    CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitSnapshot,
    CircuitState,
};
pub use presets::{
    content_service_config, gateway_forward_config, identity_service_config, registry_config,
    ServiceConfig,
};
pub use retry::{with_retry, CallKind, RetryConfig, RetryError};
pub use timeout::{with_timeout_result, TimeoutConfig, TimeoutError};
