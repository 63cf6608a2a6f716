//! HTTP client for a discovery service

use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use resilience::{presets, CallKind, ResilientCall};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::instance::{InstanceStatus, Registration, ServiceInstance};
use crate::ServiceRegistry;

const DEPENDENCY: &str = "discovery-service";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub instance_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: InstanceStatus,
}

/// `ServiceRegistry` backed by the discovery service's HTTP protocol
///
/// Calls go through their own breaker, so a dead discovery service costs
/// one short-circuit instead of a connect timeout per lookup.
#[derive(Clone, Debug)]
pub struct RemoteRegistry {
    base_url: String,
    client: Client,
    policy: ResilientCall,
}

impl RemoteRegistry {
    pub fn new(base_url: impl Into<String>) -> RegistryResult<Self> {
        let config = presets::registry_config();
        let client = Client::builder()
            .timeout(config.timeout.duration + Duration::from_millis(250))
            .build()
            .map_err(|e| RegistryError::Unavailable(format!("HTTP client: {}", e)))?;
        Ok(Self::with_client(base_url, client, ResilientCall::new(DEPENDENCY, config)))
    }

    pub fn with_client(base_url: impl Into<String>, client: Client, policy: ResilientCall) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            policy,
        }
    }

    /// `base_url` joined with `segments`, each percent-encoded as one path segment
    fn url(&self, segments: &[&str]) -> RegistryResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| RegistryError::Unavailable(format!("registry URL {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| RegistryError::Unavailable(format!("registry URL {} has no path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send under the breaker; only transport errors and 5xx count as failures
    async fn send<B>(&self, kind: CallKind, build: B) -> RegistryResult<Response>
    where
        B: Fn() -> RequestBuilder + Send + Sync,
    {
        self.policy
            .call(kind, || {
                let request = build();
                async move {
                    let response = request.send().await.map_err(|e| e.to_string())?;
                    if response.status().is_server_error() {
                        return Err(format!("status {}", response.status()));
                    }
                    Ok(response)
                }
            })
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))
    }

    async fn expect_success(response: Response, subject: &str) -> RegistryResult<Response> {
        match response.status() {
            s if s.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(RegistryError::NotFound(subject.to_string())),
            StatusCode::BAD_REQUEST => {
                let body = response.text().await.unwrap_or_default();
                Err(RegistryError::Validation(body))
            }
            other => Err(RegistryError::Unavailable(format!(
                "unexpected status {} for {}",
                other, subject
            ))),
        }
    }
}

#[async_trait::async_trait]
impl ServiceRegistry for RemoteRegistry {
    async fn register(&self, registration: Registration) -> RegistryResult<String> {
        let url = self.url(&["register"])?;
        let response = self
            .send(CallKind::NonIdempotent, || {
                self.client.post(url.clone()).json(&registration)
            })
            .await?;
        let response = Self::expect_success(response, &registration.instance_id).await?;
        let body: RegisterResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::Unavailable(format!("register response: {}", e)))?;
        Ok(body.instance_id)
    }

    async fn heartbeat(&self, instance_id: &str) -> RegistryResult<()> {
        let url = self.url(&["heartbeat", instance_id])?;
        // Refreshing a lease twice is harmless
        let response = self
            .send(CallKind::IdempotentRead, || self.client.post(url.clone()))
            .await?;
        Self::expect_success(response, instance_id).await?;
        debug!(instance_id = %instance_id, "Heartbeat sent");
        Ok(())
    }

    async fn deregister(&self, instance_id: &str) -> RegistryResult<()> {
        let url = self.url(&["instance", instance_id])?;
        let response = self
            .send(CallKind::NonIdempotent, || self.client.delete(url.clone()))
            .await?;
        Self::expect_success(response, instance_id).await?;
        Ok(())
    }

    async fn resolve(&self, service_name: &str) -> RegistryResult<Vec<ServiceInstance>> {
        let url = self.url(&["services", service_name])?;
        let response = self
            .send(CallKind::IdempotentRead, || self.client.get(url.clone()))
            .await?;
        let response = Self::expect_success(response, service_name).await?;
        response
            .json::<Vec<ServiceInstance>>()
            .await
            .map_err(|e| RegistryError::Unavailable(format!("resolve response: {}", e)))
    }

    async fn set_status(&self, instance_id: &str, status: InstanceStatus) -> RegistryResult<()> {
        let url = self.url(&["instance", instance_id, "status"])?;
        let body = StatusUpdate { status };
        let response = self
            .send(CallKind::NonIdempotent, || self.client.put(url.clone()).json(&body))
            .await?;
        Self::expect_success(response, instance_id).await?;
        Ok(())
    }

    async fn list(&self) -> RegistryResult<BTreeMap<String, Vec<ServiceInstance>>> {
        let url = self.url(&["services"])?;
        let response = self
            .send(CallKind::IdempotentRead, || self.client.get(url.clone()))
            .await?;
        let response = Self::expect_success(response, "services").await?;
        response
            .json()
            .await
            .map_err(|e| RegistryError::Unavailable(format!("list response: {}", e)))
    }
}
