/// Circuit Breaker with a time-windowed failure count
///
/// State transitions:
/// - Closed → Open: when failures inside the sliding window reach the threshold
/// - Open → HalfOpen: on the first call after the cooldown elapsed
/// - HalfOpen → Closed: when the single trial call succeeds
/// - HalfOpen → Open: when the trial call fails (cooldown restarts)
///
/// Every transition bumps a generation counter. Outcomes are applied only
/// if they were admitted under the current generation, so two calls racing
/// to report a failure produce exactly one Closed → Open transition.
use chrono::{DateTime, Utc};
use murmur_common::clock::{system_clock, to_chrono, SharedClock};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation, requests pass through
    Closed,
    /// Circuit is open, requests fail fast
    Open,
    /// Cooldown elapsed, one trial request allowed
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures inside `failure_window` that open the circuit
    pub failure_threshold: u32,
    /// Sliding window over which failures are counted
    pub failure_window: Duration,
    /// How long the circuit stays open before a trial call is allowed
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Point-in-time view of a breaker, for health endpoints and tests
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub opened_until: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError {
    #[error("Circuit breaker is open - failing fast")]
    Open,
    #[error("Call failed: {0}")]
    CallFailed(String),
}

struct BreakerState {
    current: CircuitState,
    failures: VecDeque<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
    opened_until: Option<DateTime<Utc>>,
    trial_in_flight: bool,
    generation: u64,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            current: CircuitState::Closed,
            failures: VecDeque::new(),
            last_failure_at: None,
            opened_until: None,
            trial_in_flight: false,
            generation: 0,
        }
    }
}

#[derive(Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: CircuitBreakerConfig,
    state: Arc<Mutex<BreakerState>>,
    clock: SharedClock,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Admission ticket for one protected call
///
/// Must be settled with `success()` or `failure()`. A permit dropped
/// unsettled (e.g. the caller was cancelled) releases a half-open trial
/// slot without counting as either outcome.
pub struct CallPermit {
    breaker: CircuitBreaker,
    generation: u64,
    trial: bool,
    settled: bool,
}

impl CallPermit {
    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.generation);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.generation);
    }

    pub fn is_trial(&self) -> bool {
        self.trial
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.release_trial(self.generation);
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, system_clock())
    }

    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: SharedClock,
    ) -> Self {
        let name: String = name.into();
        debug!(
            dependency = %name,
            failure_threshold = config.failure_threshold,
            cooldown = ?config.cooldown,
            "Circuit breaker created"
        );
        Self {
            name: Arc::from(name),
            config,
            state: Arc::new(Mutex::new(BreakerState::closed())),
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute a future with circuit breaker protection
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let permit = self.try_acquire()?;

        match f().await {
            Ok(result) => {
                permit.success();
                Ok(result)
            }
            Err(e) => {
                permit.failure();
                Err(CircuitBreakerError::CallFailed(e.to_string()))
            }
        }
    }

    /// Ask for admission. Fails fast while open or while the half-open
    /// trial is already in flight.
    pub fn try_acquire(&self) -> Result<CallPermit, CircuitBreakerError> {
        let mut state = self.state.lock();
        let now = self.clock.now();

        match state.current {
            CircuitState::Closed => Ok(self.permit(state.generation, false)),
            CircuitState::Open => {
                let cooled_down = state.opened_until.map(|until| now >= until).unwrap_or(true);
                if !cooled_down {
                    return Err(CircuitBreakerError::Open);
                }
                self.transition(&mut state, CircuitState::HalfOpen);
                state.trial_in_flight = true;
                Ok(self.permit(state.generation, true))
            }
            CircuitState::HalfOpen => {
                if state.trial_in_flight {
                    return Err(CircuitBreakerError::Open);
                }
                state.trial_in_flight = true;
                Ok(self.permit(state.generation, true))
            }
        }
    }

    fn permit(&self, generation: u64, trial: bool) -> CallPermit {
        CallPermit {
            breaker: self.clone(),
            generation,
            trial,
            settled: false,
        }
    }

    fn on_success(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.generation != generation {
            debug!(dependency = %self.name, "Ignoring success from a previous circuit epoch");
            return;
        }

        match state.current {
            CircuitState::Closed => {
                state.failures.clear();
            }
            CircuitState::HalfOpen => {
                state.trial_in_flight = false;
                state.failures.clear();
                state.opened_until = None;
                self.transition(&mut state, CircuitState::Closed);
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, generation: u64) {
        let mut state = self.state.lock();
        let now = self.clock.now();
        state.last_failure_at = Some(now);

        if state.generation != generation {
            debug!(dependency = %self.name, "Ignoring failure from a previous circuit epoch");
            return;
        }

        match state.current {
            CircuitState::Closed => {
                let window_start = now - to_chrono(self.config.failure_window);
                while state.failures.front().is_some_and(|t| *t < window_start) {
                    state.failures.pop_front();
                }
                state.failures.push_back(now);

                if state.failures.len() as u32 >= self.config.failure_threshold {
                    warn!(
                        dependency = %self.name,
                        failures = state.failures.len(),
                        window = ?self.config.failure_window,
                        "Failure threshold reached"
                    );
                    state.failures.clear();
                    state.opened_until = Some(now + to_chrono(self.config.cooldown));
                    self.transition(&mut state, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                warn!(dependency = %self.name, "Trial call failed");
                state.trial_in_flight = false;
                state.opened_until = Some(now + to_chrono(self.config.cooldown));
                self.transition(&mut state, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    fn release_trial(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.generation == generation && state.current == CircuitState::HalfOpen {
            debug!(dependency = %self.name, "Trial call abandoned, releasing slot");
            state.trial_in_flight = false;
        }
    }

    fn transition(&self, state: &mut BreakerState, to: CircuitState) {
        let from = state.current;
        state.current = to;
        state.generation += 1;

        match to {
            CircuitState::Open => warn!(
                dependency = %self.name,
                from = from.as_str(),
                to = to.as_str(),
                opened_until = ?state.opened_until,
                "Circuit breaker opened"
            ),
            _ => info!(
                dependency = %self.name,
                from = from.as_str(),
                to = to.as_str(),
                "Circuit breaker transition"
            ),
        }
        metrics::record_transition(&self.name, from.as_str(), to.as_str());
    }

    /// Get current circuit state (for monitoring)
    pub fn state(&self) -> CircuitState {
        self.state.lock().current
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let state = self.state.lock();
        CircuitSnapshot {
            state: state.current,
            failure_count: state.failures.len() as u32,
            last_failure_at: state.last_failure_at,
            opened_until: state.opened_until,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_common::{Clock, ManualClock};

    fn breaker(threshold: u32, clock: &ManualClock) -> CircuitBreaker {
        CircuitBreaker::with_clock(
            "test-dependency",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                failure_window: Duration::from_secs(60),
                cooldown: Duration::from_secs(30),
            },
            clock.shared(),
        )
    }

    #[tokio::test]
    async fn test_circuit_closed_to_open_on_threshold() {
        let clock = ManualClock::starting_now();
        let cb = breaker(3, &clock);

        for _ in 0..3 {
            let _ = cb.call(|| async { Err::<(), _>("error") }).await;
        }

        assert_eq!(cb.state(), CircuitState::Open);

        let result = cb.call(|| async { Ok::<_, String>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::Open)));
    }

    #[tokio::test]
    async fn test_failures_outside_window_do_not_accumulate() {
        let clock = ManualClock::starting_now();
        let cb = breaker(3, &clock);

        for _ in 0..2 {
            let _ = cb.call(|| async { Err::<(), _>("error") }).await;
        }
        clock.advance(Duration::from_secs(61));
        let _ = cb.call(|| async { Err::<(), _>("error") }).await;

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().failure_count, 1);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let clock = ManualClock::starting_now();
        let cb = breaker(3, &clock);

        for _ in 0..2 {
            let _ = cb.call(|| async { Err::<(), _>("error") }).await;
        }
        let _ = cb.call(|| async { Ok::<_, String>(()) }).await;
        let _ = cb.call(|| async { Err::<(), _>("error") }).await;

        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_open_to_halfopen_admits_exactly_one_trial() {
        let clock = ManualClock::starting_now();
        let cb = breaker(1, &clock);

        cb.try_acquire().unwrap().failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.try_acquire().is_err());

        clock.advance(Duration::from_secs(30));

        let trial = cb.try_acquire().expect("trial should be admitted");
        assert!(trial.is_trial());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.try_acquire().is_err(), "second caller must not get a trial");

        trial.success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_ok());
    }

    #[test]
    fn test_halfopen_failure_reopens_and_restarts_cooldown() {
        let clock = ManualClock::starting_now();
        let cb = breaker(1, &clock);

        cb.try_acquire().unwrap().failure();
        clock.advance(Duration::from_secs(30));
        cb.try_acquire().unwrap().failure();

        assert_eq!(cb.state(), CircuitState::Open);
        let reopened_until = cb.snapshot().opened_until.unwrap();
        assert_eq!(reopened_until, clock.now() + chrono::Duration::seconds(30));

        clock.advance(Duration::from_secs(29));
        assert!(cb.try_acquire().is_err());
    }

    #[test]
    fn test_racing_failures_open_circuit_once() {
        let clock = ManualClock::starting_now();
        let cb = breaker(1, &clock);

        let a = cb.try_acquire().unwrap();
        let b = cb.try_acquire().unwrap();

        a.failure();
        let first_deadline = cb.snapshot().opened_until;

        clock.advance(Duration::from_secs(5));
        b.failure();

        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.snapshot().opened_until, first_deadline);
    }

    #[test]
    fn test_dropped_trial_permit_releases_slot() {
        let clock = ManualClock::starting_now();
        let cb = breaker(1, &clock);

        cb.try_acquire().unwrap().failure();
        clock.advance(Duration::from_secs(30));

        drop(cb.try_acquire().unwrap());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let retry = cb.try_acquire().expect("slot should be free again");
        retry.success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
