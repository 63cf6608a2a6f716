//! Service discovery for Murmur
//!
//! Services find each other through a [`ServiceRegistry`]: instances
//! register with a host/port, keep their lease alive with heartbeats and
//! are resolved by service name. [`InMemoryRegistry`] is the authoritative
//! store run by the discovery service; [`RemoteRegistry`] speaks its HTTP
//! protocol from every other process.

mod agent;
mod error;
mod instance;
mod memory;
mod metrics;
mod remote;

pub use agent::{AgentHandle, RegistrationAgent};
pub use error::{RegistryError, RegistryResult};
pub use instance::{is_valid_host, InstanceStatus, Registration, ServiceInstance};
pub use memory::{InMemoryRegistry, DEFAULT_LEASE};
pub use remote::{RegisterResponse, RemoteRegistry, StatusUpdate};

use std::collections::BTreeMap;
use std::sync::Arc;

#[async_trait::async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Store an UP instance with a fresh lease; resubmitting the same id refreshes it
    async fn register(&self, registration: Registration) -> RegistryResult<String>;

    /// Refresh the lease; `NotFound` once the instance has been evicted
    async fn heartbeat(&self, instance_id: &str) -> RegistryResult<()>;

    /// Remove immediately regardless of lease
    async fn deregister(&self, instance_id: &str) -> RegistryResult<()>;

    /// Live UP instances in round-robin order; empty when none are available
    async fn resolve(&self, service_name: &str) -> RegistryResult<Vec<ServiceInstance>>;

    /// Take an instance in or out of rotation without deregistering it
    async fn set_status(&self, instance_id: &str, status: InstanceStatus) -> RegistryResult<()>;

    /// Every service with its live instances, any status
    async fn list(&self) -> RegistryResult<BTreeMap<String, Vec<ServiceInstance>>>;
}

pub type SharedRegistry = Arc<dyn ServiceRegistry>;
