use anyhow::{Context, Result};
use murmur_cache::{Cache, MemoryCache, RedisCache};
use murmur_common::system_clock;
use resilience::{presets, ResilientCall, ServiceConfig};
use service_registry::SharedRegistry;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::aggregator::FeedAggregator;
use crate::clients::{HttpContentClient, HttpIdentityClient, RegistryHttp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Redis { url: String },
}

/// Everything needed to stand up a `FeedAggregator`; shared by the feed
/// service and the gateway, which can host the aggregator in-process
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub content_service: String,
    pub identity_service: String,
    pub cache_backend: CacheBackend,
    pub cache_ttl: Duration,
    pub cache_sweep_interval: Duration,
    pub content: ServiceConfig,
    pub identity: ServiceConfig,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Address other services use to reach this instance
    pub advertised_host: String,
    pub instance_id: String,
    pub registry_url: String,
    pub heartbeat_interval: Duration,
    pub aggregator: AggregatorConfig,
}

pub fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

pub fn parse_var<T>(name: &str, default: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var_or(name, default)
        .parse()
        .with_context(|| format!("{} is not valid", name))
}

/// Apply the shared breaker/timeout overrides to a dependency preset
pub fn with_overrides(mut base: ServiceConfig, timeout_var: &str) -> Result<ServiceConfig> {
    if let Ok(ms) = std::env::var(timeout_var) {
        base.timeout.duration = Duration::from_millis(
            ms.parse()
                .with_context(|| format!("{} must be milliseconds", timeout_var))?,
        );
    }
    if let Ok(n) = std::env::var("BREAKER_FAILURE_THRESHOLD") {
        base.circuit_breaker.failure_threshold =
            n.parse().context("BREAKER_FAILURE_THRESHOLD must be a number")?;
    }
    if let Ok(secs) = std::env::var("BREAKER_COOLDOWN_SECS") {
        base.circuit_breaker.cooldown =
            Duration::from_secs(secs.parse().context("BREAKER_COOLDOWN_SECS must be seconds")?);
    }
    if let Ok(secs) = std::env::var("BREAKER_WINDOW_SECS") {
        base.circuit_breaker.failure_window =
            Duration::from_secs(secs.parse().context("BREAKER_WINDOW_SECS must be seconds")?);
    }
    Ok(base)
}

impl CacheBackend {
    pub fn from_env() -> Result<Self> {
        match var_or("CACHE_BACKEND", "memory").to_ascii_lowercase().as_str() {
            "memory" => Ok(CacheBackend::Memory),
            "redis" => Ok(CacheBackend::Redis {
                url: std::env::var("REDIS_URL")
                    .context("REDIS_URL is required when CACHE_BACKEND=redis")?,
            }),
            other => anyhow::bail!("CACHE_BACKEND must be memory or redis, got {}", other),
        }
    }

    /// Connect the configured backend; the memory cache gets a background sweeper
    pub async fn connect(&self, sweep_every: Duration) -> Result<Cache> {
        match self {
            CacheBackend::Memory => {
                let memory = Arc::new(MemoryCache::new(system_clock()));
                memory.spawn_sweeper(sweep_every);
                info!("Using in-memory cache");
                Ok(Cache::new(memory))
            }
            CacheBackend::Redis { url } => {
                let redis = RedisCache::connect(url)
                    .await
                    .context("Failed to connect to Redis")?;
                info!("Using Redis cache");
                Ok(Cache::new(Arc::new(redis)))
            }
        }
    }
}

impl AggregatorConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            content_service: var_or("CONTENT_SERVICE_NAME", "content-service"),
            identity_service: var_or("IDENTITY_SERVICE_NAME", "identity-service"),
            cache_backend: CacheBackend::from_env()?,
            cache_ttl: Duration::from_secs(parse_var("FEED_CACHE_TTL_SECS", "30")?),
            cache_sweep_interval: Duration::from_secs(parse_var("CACHE_SWEEP_INTERVAL_SECS", "30")?),
            content: with_overrides(presets::content_service_config(), "CONTENT_TIMEOUT_MS")?,
            identity: with_overrides(presets::identity_service_config(), "IDENTITY_TIMEOUT_MS")?,
        })
    }

    /// Wire HTTP clients that resolve through `registry` into an aggregator
    pub fn build(
        &self,
        registry: SharedRegistry,
        http: reqwest::Client,
        cache: Cache,
    ) -> FeedAggregator {
        let content = HttpContentClient::new(RegistryHttp::new(
            registry.clone(),
            http.clone(),
            self.content_service.clone(),
        ));
        let identity = HttpIdentityClient::new(RegistryHttp::new(
            registry,
            http,
            self.identity_service.clone(),
        ));

        FeedAggregator::new(Arc::new(content), Arc::new(identity), cache)
            .with_cache_ttl(self.cache_ttl)
            .with_policies(
                ResilientCall::new(self.content_service.clone(), self.content.clone()),
                ResilientCall::new(self.identity_service.clone(), self.identity.clone()),
            )
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            host: var_or("APP_HOST", "0.0.0.0"),
            port: parse_var("APP_PORT", "8084")?,
            advertised_host: var_or("SERVICE_HOST", "127.0.0.1"),
            instance_id: std::env::var("INSTANCE_ID")
                .unwrap_or_else(|_| format!("feed-service-{}", uuid::Uuid::new_v4())),
            registry_url: var_or("REGISTRY_URL", "http://127.0.0.1:8761"),
            heartbeat_interval: Duration::from_secs(parse_var("HEARTBEAT_INTERVAL_SECS", "30")?),
            aggregator: AggregatorConfig::from_env()?,
        })
    }
}
