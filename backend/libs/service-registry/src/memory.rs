//! In-process lease registry

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use murmur_common::clock::{system_clock, to_chrono, SharedClock};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{RegistryError, RegistryResult};
use crate::instance::{InstanceStatus, Registration, ServiceInstance};
use crate::metrics;
use crate::ServiceRegistry;

/// Three missed 30s heartbeats
pub const DEFAULT_LEASE: Duration = Duration::from_secs(90);

#[derive(Debug, Default)]
struct Directory {
    /// service name -> instance id -> instance, ordered by id for deterministic rotation
    services: HashMap<String, BTreeMap<String, ServiceInstance>>,
    /// instance id -> service name
    owners: HashMap<String, String>,
}

impl Directory {
    fn insert(&mut self, instance: ServiceInstance) {
        if let Some(previous) = self.owners.get(&instance.instance_id).cloned() {
            if previous != instance.service_name {
                self.remove(&instance.instance_id);
            }
        }
        self.owners
            .insert(instance.instance_id.clone(), instance.service_name.clone());
        let service = instance.service_name.clone();
        self.services
            .entry(service.clone())
            .or_default()
            .insert(instance.instance_id.clone(), instance);
        self.publish(&service);
    }

    fn get_mut(&mut self, instance_id: &str) -> Option<&mut ServiceInstance> {
        let service = self.owners.get(instance_id)?;
        self.services.get_mut(service)?.get_mut(instance_id)
    }

    fn remove(&mut self, instance_id: &str) -> Option<ServiceInstance> {
        let service = self.owners.remove(instance_id)?;
        let instances = self.services.get_mut(&service)?;
        let removed = instances.remove(instance_id);
        if instances.is_empty() {
            self.services.remove(&service);
        }
        self.publish(&service);
        removed
    }

    fn publish(&self, service: &str) {
        metrics::set_instances(service, self.services.get(service).map_or(0, BTreeMap::len));
    }
}

/// Directory of service instances kept alive by heartbeats
///
/// Reads and heartbeats take short locks; eviction removes each expired
/// instance under the write lock, so readers see an instance either fully
/// present or fully gone. Expired instances are filtered out of `resolve`
/// even before the sweep reaches them.
#[derive(Debug)]
pub struct InMemoryRegistry {
    directory: RwLock<Directory>,
    cursors: DashMap<String, AtomicUsize>,
    lease: chrono::Duration,
    clock: SharedClock,
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_LEASE)
    }
}

impl InMemoryRegistry {
    pub fn new(lease: Duration) -> Self {
        Self::with_clock(lease, system_clock())
    }

    pub fn with_clock(lease: Duration, clock: SharedClock) -> Self {
        Self {
            directory: RwLock::new(Directory::default()),
            cursors: DashMap::new(),
            lease: to_chrono(lease),
            clock,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Remove every instance whose lease has run out, returning their ids
    pub fn evict_expired(&self) -> Vec<String> {
        let now = self.now();
        let expired: Vec<String> = {
            let directory = self.directory.read();
            directory
                .services
                .values()
                .flat_map(|instances| instances.values())
                .filter(|instance| instance.is_expired(now, self.lease))
                .map(|instance| instance.instance_id.clone())
                .collect()
        };

        let mut evicted = Vec::with_capacity(expired.len());
        for instance_id in expired {
            let mut directory = self.directory.write();
            // A heartbeat may have landed since the scan
            let still_expired = directory
                .get_mut(&instance_id)
                .is_some_and(|instance| instance.is_expired(now, self.lease));
            if still_expired {
                if let Some(instance) = directory.remove(&instance_id) {
                    info!(
                        service = %instance.service_name,
                        instance_id = %instance.instance_id,
                        last_heartbeat_at = %instance.last_heartbeat_at,
                        "Evicted instance with expired lease"
                    );
                    evicted.push(instance_id);
                }
            }
        }
        evicted
    }

    /// Run `evict_expired` on a fixed interval until the registry is dropped
    pub fn spawn_eviction_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let evicted = registry.evict_expired();
                if !evicted.is_empty() {
                    debug!(count = evicted.len(), "Eviction sweep finished");
                }
            }
        })
    }

    fn next_offset(&self, service_name: &str, len: usize) -> usize {
        if let Some(cursor) = self.cursors.get(service_name) {
            return cursor.fetch_add(1, Ordering::Relaxed) % len;
        }
        self.cursors
            .entry(service_name.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed)
            % len
    }

    fn resolve_now(&self, service_name: &str) -> Vec<ServiceInstance> {
        let now = self.now();
        let mut candidates: Vec<ServiceInstance> = {
            let directory = self.directory.read();
            match directory.services.get(service_name) {
                Some(instances) => instances
                    .values()
                    .filter(|i| i.status == InstanceStatus::Up && !i.is_expired(now, self.lease))
                    .cloned()
                    .collect(),
                None => Vec::new(),
            }
        };

        if candidates.len() > 1 {
            let offset = self.next_offset(service_name, candidates.len());
            candidates.rotate_left(offset);
        }
        candidates
    }
}

#[async_trait::async_trait]
impl ServiceRegistry for InMemoryRegistry {
    async fn register(&self, registration: Registration) -> RegistryResult<String> {
        let instance = registration.validate(self.now())?;
        let instance_id = instance.instance_id.clone();
        info!(
            service = %instance.service_name,
            instance_id = %instance_id,
            host = %instance.host,
            port = instance.port,
            "Registered instance"
        );
        self.directory.write().insert(instance);
        Ok(instance_id)
    }

    async fn heartbeat(&self, instance_id: &str) -> RegistryResult<()> {
        let now = self.now();
        let mut directory = self.directory.write();
        let expired = match directory.get_mut(instance_id) {
            None => return Err(RegistryError::NotFound(instance_id.to_string())),
            Some(instance) if instance.is_expired(now, self.lease) => true,
            Some(instance) => {
                instance.last_heartbeat_at = now;
                false
            }
        };

        if expired {
            // Same outcome as if the sweep had already run
            directory.remove(instance_id);
            debug!(instance_id = %instance_id, "Heartbeat after lease expiry");
            return Err(RegistryError::NotFound(instance_id.to_string()));
        }
        Ok(())
    }

    async fn deregister(&self, instance_id: &str) -> RegistryResult<()> {
        match self.directory.write().remove(instance_id) {
            Some(instance) => {
                info!(
                    service = %instance.service_name,
                    instance_id = %instance_id,
                    "Deregistered instance"
                );
                Ok(())
            }
            None => Err(RegistryError::NotFound(instance_id.to_string())),
        }
    }

    async fn resolve(&self, service_name: &str) -> RegistryResult<Vec<ServiceInstance>> {
        Ok(self.resolve_now(service_name))
    }

    async fn set_status(&self, instance_id: &str, status: InstanceStatus) -> RegistryResult<()> {
        let now = self.now();
        let mut directory = self.directory.write();
        match directory.get_mut(instance_id) {
            Some(instance) if !instance.is_expired(now, self.lease) => {
                info!(
                    instance_id = %instance_id,
                    from = instance.status.as_str(),
                    to = status.as_str(),
                    "Instance status changed"
                );
                instance.status = status;
                Ok(())
            }
            _ => Err(RegistryError::NotFound(instance_id.to_string())),
        }
    }

    async fn list(&self) -> RegistryResult<BTreeMap<String, Vec<ServiceInstance>>> {
        let now = self.now();
        let directory = self.directory.read();
        Ok(directory
            .services
            .iter()
            .filter_map(|(name, instances)| {
                let live: Vec<ServiceInstance> = instances
                    .values()
                    .filter(|i| !i.is_expired(now, self.lease))
                    .cloned()
                    .collect();
                (!live.is_empty()).then(|| (name.clone(), live))
            })
            .collect())
    }
}
