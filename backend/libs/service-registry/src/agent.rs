//! Self-registration for a running service
//!
//! Registers once at startup, heartbeats on a fixed interval, registers
//! again when the registry reports the instance as evicted, and
//! deregisters on shutdown.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::RegistryError;
use crate::instance::Registration;
use crate::ServiceRegistry;

pub struct RegistrationAgent {
    registry: Arc<dyn ServiceRegistry>,
    registration: Registration,
    heartbeat_interval: Duration,
}

/// Running agent; dropping it stops heartbeats without deregistering
pub struct AgentHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    registry: Arc<dyn ServiceRegistry>,
    instance_id: String,
}

impl RegistrationAgent {
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        registration: Registration,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            registry,
            registration,
            heartbeat_interval,
        }
    }

    /// Start the register/heartbeat loop in the background
    pub fn spawn(self) -> AgentHandle {
        let (shutdown, mut stop) = watch::channel(false);
        let registry = self.registry.clone();
        let instance_id = self.registration.instance_id.clone();

        let task = tokio::spawn(async move {
            let mut registered = self.register().await;
            let mut ticker = tokio::time::interval(self.heartbeat_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        registered = if registered {
                            self.beat().await
                        } else {
                            self.register().await
                        };
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        AgentHandle {
            shutdown,
            task,
            registry,
            instance_id,
        }
    }

    async fn register(&self) -> bool {
        match self.registry.register(self.registration.clone()).await {
            Ok(instance_id) => {
                info!(
                    service = %self.registration.service_name,
                    instance_id = %instance_id,
                    "Registered with discovery"
                );
                true
            }
            Err(e) => {
                warn!(
                    service = %self.registration.service_name,
                    error = %e,
                    "Registration failed; retrying on next tick"
                );
                false
            }
        }
    }

    /// Returns whether the instance is still known to be registered
    async fn beat(&self) -> bool {
        match self.registry.heartbeat(&self.registration.instance_id).await {
            Ok(()) => true,
            Err(RegistryError::NotFound(_)) => {
                warn!(
                    instance_id = %self.registration.instance_id,
                    "Instance evicted by registry; registering again"
                );
                self.register().await
            }
            Err(e) => {
                // Lease may still be valid; keep heartbeating
                warn!(
                    instance_id = %self.registration.instance_id,
                    error = %e,
                    "Heartbeat failed"
                );
                true
            }
        }
    }
}

impl AgentHandle {
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Stop heartbeating and remove the instance from the registry
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Registration agent task failed");
        }
        match self.registry.deregister(&self.instance_id).await {
            Ok(()) => info!(instance_id = %self.instance_id, "Deregistered from discovery"),
            Err(e) => warn!(instance_id = %self.instance_id, error = %e, "Deregistration failed"),
        }
    }
}
