//! Directory records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::error::{RegistryError, RegistryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstanceStatus {
    Up,
    Down,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Up => "UP",
            InstanceStatus::Down => "DOWN",
        }
    }
}

/// One live (or recently live) process of a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub instance_id: String,
    pub last_heartbeat_at: DateTime<Utc>,
    pub status: InstanceStatus,
}

impl ServiceInstance {
    /// Base URL for plain HTTP calls to this instance
    pub fn base_url(&self) -> String {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) => format!("http://[{}]:{}", v6, self.port),
            _ => format!("http://{}:{}", self.host, self.port),
        }
    }

    /// Lease has run out: `now - last_heartbeat_at > lease`
    pub fn is_expired(&self, now: DateTime<Utc>, lease: chrono::Duration) -> bool {
        now - self.last_heartbeat_at > lease
    }
}

/// Registration request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub service_name: String,
    pub host: String,
    /// Wider than u16 so out-of-range ports reach validation instead of failing to parse
    pub port: u32,
    pub instance_id: String,
}

impl Registration {
    pub fn new(
        service_name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            host: host.into(),
            port: u32::from(port),
            instance_id: instance_id.into(),
        }
    }

    /// Check the request and produce a fresh UP instance
    pub fn validate(&self, now: DateTime<Utc>) -> RegistryResult<ServiceInstance> {
        if self.service_name.trim().is_empty() {
            return Err(RegistryError::Validation("serviceName is required".into()));
        }
        if self.instance_id.trim().is_empty() {
            return Err(RegistryError::Validation("instanceId is required".into()));
        }
        if !is_valid_host(&self.host) {
            return Err(RegistryError::Validation(format!(
                "host '{}' is not a valid hostname or IP address",
                self.host
            )));
        }
        let port = u16::try_from(self.port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| {
                RegistryError::Validation(format!("port {} is outside 1-65535", self.port))
            })?;

        Ok(ServiceInstance {
            service_name: self.service_name.clone(),
            host: self.host.clone(),
            port,
            instance_id: self.instance_id.clone(),
            last_heartbeat_at: now,
            status: InstanceStatus::Up,
        })
    }
}

/// IP literal or RFC 1123 hostname
pub fn is_valid_host(host: &str) -> bool {
    if host.parse::<IpAddr>().is_ok() {
        return true;
    }
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
