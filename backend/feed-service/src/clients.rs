//! Downstream clients for the content and identity services
//!
//! Instances are resolved through the registry on every attempt, so a
//! retry lands on the next instance in round-robin order.

use murmur_common::headers::{CORRELATION_ID, PRINCIPAL_SUBJECT};
use reqwest::{Client, RequestBuilder};
use service_registry::{ServiceInstance, SharedRegistry};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::context::RequestContext;
use crate::models::{BatchLookup, IdentityMap, PostRecord, PostsResponse};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("no live instance of {0}")]
    NoInstance(String),

    #[error("registry lookup failed: {0}")]
    Registry(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("invalid response body: {0}")]
    Decode(String),
}

/// What to fetch from the content service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostQuery {
    pub author_id: Option<String>,
    pub cursor: Option<String>,
    pub limit: u32,
}

#[async_trait::async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_posts(
        &self,
        ctx: &RequestContext,
        query: &PostQuery,
    ) -> Result<(Vec<PostRecord>, Option<String>), ClientError>;
}

#[async_trait::async_trait]
pub trait IdentitySource: Send + Sync {
    /// One batched lookup for every id
    async fn lookup(&self, ctx: &RequestContext, ids: &[String]) -> Result<IdentityMap, ClientError>;
}

/// Resolves a named service through the registry and issues HTTP calls to it
#[derive(Clone)]
pub struct RegistryHttp {
    registry: SharedRegistry,
    http: Client,
    service_name: Arc<str>,
}

impl RegistryHttp {
    pub fn new(registry: SharedRegistry, http: Client, service_name: impl Into<String>) -> Self {
        Self {
            registry,
            http,
            service_name: Arc::from(service_name.into()),
        }
    }

    async fn instance(&self) -> Result<ServiceInstance, ClientError> {
        let candidates = self
            .registry
            .resolve(&self.service_name)
            .await
            .map_err(|e| ClientError::Registry(e.to_string()))?;
        candidates
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::NoInstance(self.service_name.to_string()))
    }

    fn with_context(request: RequestBuilder, ctx: &RequestContext) -> RequestBuilder {
        request
            .header(PRINCIPAL_SUBJECT, &ctx.subject_id)
            .header(CORRELATION_ID, ctx.correlation_id.as_str())
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

pub struct HttpContentClient {
    inner: RegistryHttp,
}

impl HttpContentClient {
    pub fn new(inner: RegistryHttp) -> Self {
        Self { inner }
    }
}

#[async_trait::async_trait]
impl ContentSource for HttpContentClient {
    async fn fetch_posts(
        &self,
        ctx: &RequestContext,
        query: &PostQuery,
    ) -> Result<(Vec<PostRecord>, Option<String>), ClientError> {
        let instance = self.inner.instance().await?;
        let mut params: Vec<(&str, String)> = vec![("limit", query.limit.to_string())];
        if let Some(cursor) = &query.cursor {
            params.push(("cursor", cursor.clone()));
        }
        if let Some(author) = &query.author_id {
            params.push(("authorId", author.clone()));
        }

        debug!(instance_id = %instance.instance_id, ?query, "Fetching posts");
        let request = self
            .inner
            .http
            .get(format!("{}/posts", instance.base_url()))
            .query(&params);
        let page: PostsResponse = self
            .inner
            .send(RegistryHttp::with_context(request, ctx))
            .await?;
        Ok(page.into_parts())
    }
}

pub struct HttpIdentityClient {
    inner: RegistryHttp,
}

impl HttpIdentityClient {
    pub fn new(inner: RegistryHttp) -> Self {
        Self { inner }
    }
}

#[async_trait::async_trait]
impl IdentitySource for HttpIdentityClient {
    async fn lookup(&self, ctx: &RequestContext, ids: &[String]) -> Result<IdentityMap, ClientError> {
        let instance = self.inner.instance().await?;
        debug!(instance_id = %instance.instance_id, count = ids.len(), "Batch identity lookup");
        let request = self
            .inner
            .http
            .post(format!("{}/users/batch", instance.base_url()))
            .json(&BatchLookup { ids: ids.to_vec() });
        self.inner
            .send(RegistryHttp::with_context(request, ctx))
            .await
    }
}
