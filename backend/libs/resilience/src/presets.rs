/// Preset configurations for Murmur's outbound dependencies
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::retry::RetryConfig;
use crate::timeout::TimeoutConfig;
use std::time::Duration;

/// Configuration bundle for a dependency
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub timeout: TimeoutConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    /// Applied to idempotent reads only
    pub retry: Option<RetryConfig>,
}

/// Content service: fatal to the feed, so it gets a generous deadline
///
/// - Timeout: 2s
/// - Circuit breaker: 5 failures in 30s, 30s cooldown
/// - Retry: once, 100ms backoff
pub fn content_service_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(2),
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 5,
            failure_window: Duration::from_secs(30),
            cooldown: Duration::from_secs(30),
        },
        retry: Some(RetryConfig {
            max_retries: 1,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: true,
        }),
    }
}

/// Identity service: degradable, so fail fast and fall back
///
/// - Timeout: 500ms
/// - Circuit breaker: 3 failures in 30s, 15s cooldown
/// - Retry: once, 50ms backoff
pub fn identity_service_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_millis(500),
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 3,
            failure_window: Duration::from_secs(30),
            cooldown: Duration::from_secs(15),
        },
        retry: Some(RetryConfig {
            max_retries: 1,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter: true,
        }),
    }
}

/// Gateway forwards to arbitrary registered services
///
/// - Timeout: 10s
/// - Circuit breaker: 5 failures in 60s, 30s cooldown
/// - Retry: once for GET/HEAD
pub fn gateway_forward_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(10),
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
        },
        retry: Some(RetryConfig::default()),
    }
}

/// Discovery service lookups
///
/// - Timeout: 1s
/// - Circuit breaker: 3 failures in 10s, 5s cooldown
/// - Retry: once
pub fn registry_config() -> ServiceConfig {
    ServiceConfig {
        timeout: TimeoutConfig {
            duration: Duration::from_secs(1),
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 3,
            failure_window: Duration::from_secs(10),
            cooldown: Duration::from_secs(5),
        },
        retry: Some(RetryConfig {
            max_retries: 1,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(200),
            backoff_multiplier: 2.0,
            jitter: true,
        }),
    }
}
