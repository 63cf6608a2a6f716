//! Resilient outbound call
//!
//! `ResilientCall` composes the per-dependency policy around one call:
//! breaker admission, a deadline per attempt, retries for idempotent reads,
//! and an optional caller-supplied fallback. The breaker records exactly
//! one outcome per call, after retries are exhausted.

use murmur_common::clock::{system_clock, SharedClock};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState};
use crate::metrics;
use crate::presets::ServiceConfig;
use crate::retry::{with_retry, CallKind, RetryConfig};
use crate::timeout::{with_timeout_result, TimeoutError};

/// Why a protected call did not produce a primary result
#[derive(Debug, thiserror::Error)]
pub enum CallError<E> {
    #[error("circuit open for {dependency}; call short-circuited")]
    ShortCircuited { dependency: String },

    #[error("{dependency} timed out after {after:?}")]
    TimedOut { dependency: String, after: Duration },

    #[error("{dependency} call failed: {error}")]
    Failed { dependency: String, error: E },
}

impl<E> CallError<E> {
    pub fn is_short_circuit(&self) -> bool {
        matches!(self, CallError::ShortCircuited { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CallError::TimedOut { .. })
    }

    pub fn dependency(&self) -> &str {
        match self {
            CallError::ShortCircuited { dependency }
            | CallError::TimedOut { dependency, .. }
            | CallError::Failed { dependency, .. } => dependency,
        }
    }
}

/// Why a fallback was served
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackCause {
    CircuitOpen,
    Timeout,
    Failed(String),
}

impl fmt::Display for FallbackCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackCause::CircuitOpen => write!(f, "circuit open"),
            FallbackCause::Timeout => write!(f, "timeout"),
            FallbackCause::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

impl<E: fmt::Display> From<&CallError<E>> for FallbackCause {
    fn from(err: &CallError<E>) -> Self {
        match err {
            CallError::ShortCircuited { .. } => FallbackCause::CircuitOpen,
            CallError::TimedOut { .. } => FallbackCause::Timeout,
            CallError::Failed { error, .. } => FallbackCause::Failed(error.to_string()),
        }
    }
}

/// Result of a call made with a fallback: either the real answer or the
/// degraded substitute, never an error
#[derive(Debug, Clone, PartialEq)]
pub enum Served<T> {
    Primary(T),
    Fallback { value: T, cause: FallbackCause },
}

impl<T> Served<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Served::Fallback { .. })
    }

    pub fn into_inner(self) -> T {
        match self {
            Served::Primary(value) | Served::Fallback { value, .. } => value,
        }
    }
}

/// Resilience policy bound to one named dependency
#[derive(Clone, Debug)]
pub struct ResilientCall {
    dependency: Arc<str>,
    breaker: CircuitBreaker,
    timeout: Duration,
    retry: RetryConfig,
}

impl ResilientCall {
    pub fn new(dependency: impl Into<String>, config: ServiceConfig) -> Self {
        Self::with_clock(dependency, config, system_clock())
    }

    pub fn with_clock(
        dependency: impl Into<String>,
        config: ServiceConfig,
        clock: SharedClock,
    ) -> Self {
        let dependency: String = dependency.into();
        Self {
            breaker: CircuitBreaker::with_clock(dependency.clone(), config.circuit_breaker, clock),
            dependency: Arc::from(dependency),
            timeout: config.timeout.duration,
            retry: config.retry.unwrap_or_else(RetryConfig::none),
        }
    }

    pub fn dependency(&self) -> &str {
        &self.dependency
    }

    pub fn state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        self.breaker.snapshot()
    }

    fn retry_for(&self, kind: CallKind) -> RetryConfig {
        match kind {
            CallKind::IdempotentRead => self.retry.clone(),
            CallKind::NonIdempotent => RetryConfig::none(),
        }
    }

    /// Run `op` under the dependency's breaker, deadline and retry policy
    pub async fn call<F, Fut, T, E>(&self, kind: CallKind, mut op: F) -> Result<T, CallError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let permit = match self.breaker.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                info!(dependency = %self.dependency, outcome = "short_circuited", "Call short-circuited by open circuit");
                metrics::record_call(&self.dependency, "short_circuited");
                return Err(CallError::ShortCircuited {
                    dependency: self.dependency.to_string(),
                });
            }
        };

        let deadline = self.timeout;
        let retry = self.retry_for(kind);
        let result = with_retry(&retry, || with_timeout_result(deadline, op())).await;

        match result {
            Ok(value) => {
                permit.success();
                debug!(dependency = %self.dependency, outcome = "success", "Call succeeded");
                metrics::record_call(&self.dependency, "success");
                Ok(value)
            }
            Err(exhausted) => {
                permit.failure();
                let err = match exhausted.last {
                    TimeoutError::Elapsed(after) => {
                        metrics::record_call(&self.dependency, "timeout");
                        CallError::TimedOut {
                            dependency: self.dependency.to_string(),
                            after,
                        }
                    }
                    TimeoutError::Failed(error) => {
                        metrics::record_call(&self.dependency, "failure");
                        CallError::Failed {
                            dependency: self.dependency.to_string(),
                            error,
                        }
                    }
                };
                warn!(
                    dependency = %self.dependency,
                    outcome = "failure",
                    attempts = exhausted.attempts,
                    error = %err,
                    "Dependency call failed"
                );
                Err(err)
            }
        }
    }

    /// Like `call`, but any failure (open circuit, timeout, error) yields
    /// the caller's degraded value instead of an error
    pub async fn call_with_fallback<F, Fut, T, E, FB>(
        &self,
        kind: CallKind,
        op: F,
        fallback: FB,
    ) -> Served<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        FB: FnOnce() -> T,
    {
        match self.call(kind, op).await {
            Ok(value) => Served::Primary(value),
            Err(err) => {
                let cause = FallbackCause::from(&err);
                info!(
                    dependency = %self.dependency,
                    outcome = "fallback_served",
                    cause = %cause,
                    "Serving fallback"
                );
                metrics::record_call(&self.dependency, "fallback_served");
                Served::Fallback {
                    value: fallback(),
                    cause,
                }
            }
        }
    }
}
