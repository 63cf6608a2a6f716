//! Per-dependency policy registry
//!
//! Hands out one `ResilientCall` per dependency name so every caller of
//! the same dependency shares one circuit, while different dependencies
//! never share state.

use dashmap::DashMap;
use murmur_common::clock::{system_clock, SharedClock};
use std::collections::HashMap;

use crate::call::ResilientCall;
use crate::circuit_breaker::CircuitSnapshot;
use crate::presets::ServiceConfig;

pub struct ResilienceRegistry {
    default_config: ServiceConfig,
    overrides: HashMap<String, ServiceConfig>,
    calls: DashMap<String, ResilientCall>,
    clock: SharedClock,
}

impl ResilienceRegistry {
    pub fn new(default_config: ServiceConfig) -> Self {
        Self::with_clock(default_config, system_clock())
    }

    pub fn with_clock(default_config: ServiceConfig, clock: SharedClock) -> Self {
        Self {
            default_config,
            overrides: HashMap::new(),
            calls: DashMap::new(),
            clock,
        }
    }

    /// Use a specific policy for one dependency
    pub fn with_override(mut self, dependency: impl Into<String>, config: ServiceConfig) -> Self {
        self.overrides.insert(dependency.into(), config);
        self
    }

    /// Get the shared policy for a dependency, creating it on first use
    pub fn get(&self, dependency: &str) -> ResilientCall {
        if let Some(existing) = self.calls.get(dependency) {
            return existing.clone();
        }

        self.calls
            .entry(dependency.to_string())
            .or_insert_with(|| {
                let config = self
                    .overrides
                    .get(dependency)
                    .cloned()
                    .unwrap_or_else(|| self.default_config.clone());
                ResilientCall::with_clock(dependency, config, self.clock.clone())
            })
            .clone()
    }

    /// State of every breaker created so far, sorted by dependency name
    pub fn snapshots(&self) -> Vec<(String, CircuitSnapshot)> {
        let mut out: Vec<(String, CircuitSnapshot)> = self
            .calls
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use crate::retry::CallKind;
    use crate::presets;

    #[tokio::test]
    async fn test_dependencies_have_independent_circuits() {
        let mut config = presets::gateway_forward_config();
        config.circuit_breaker.failure_threshold = 1;
        let registry = ResilienceRegistry::new(config);

        let identity = registry.get("identity-service");
        let _ = identity
            .call(CallKind::NonIdempotent, || async { Err::<(), _>("down") })
            .await;

        assert_eq!(registry.get("identity-service").state(), CircuitState::Open);
        assert_eq!(registry.get("content-service").state(), CircuitState::Closed);
    }

    #[test]
    fn test_override_applies_to_named_dependency() {
        let mut strict = presets::gateway_forward_config();
        strict.circuit_breaker.failure_threshold = 1;
        let registry = ResilienceRegistry::new(presets::gateway_forward_config())
            .with_override("fragile-service", strict);

        let _ = registry.get("fragile-service");
        let _ = registry.get("content-service");

        let names: Vec<String> = registry.snapshots().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["content-service", "fragile-service"]);
    }
}
