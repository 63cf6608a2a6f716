//! Configuration for the API gateway
//!
//! Loads settings from:
//! 1. Environment variables
//! 2. .env file (local development)
//! 3. A TOML routes file (`GATEWAY_ROUTES_FILE`), falling back to the
//!    built-in table when the file is absent

use anyhow::{Context, Result};
use crypto_core::JwtValidator;
use feed_service::config::{parse_var, var_or, with_overrides, AggregatorConfig};
use resilience::{presets, ServiceConfig};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

use crate::routes::{RouteEntry, RouteTable};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub registry_url: String,
    pub routes_file: String,
    pub max_body_bytes: usize,
    pub jwt: JwtConfig,
    /// Policy for forwards, one circuit per target service
    pub forward: ServiceConfig,
    pub aggregator: AggregatorConfig,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Option<String>,
    pub public_key_pem: Option<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub leeway_secs: u64,
}

impl JwtConfig {
    fn from_env() -> Result<Self> {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Ok(Self {
            secret: non_empty("JWT_SECRET"),
            public_key_pem: non_empty("JWT_PUBLIC_KEY_PEM"),
            issuer: non_empty("JWT_ISSUER"),
            audience: non_empty("JWT_AUDIENCE"),
            leeway_secs: parse_var("JWT_LEEWAY_SECS", "30")?,
        })
    }

    /// RS256 when a public key is configured, otherwise HS256
    pub fn validator(&self) -> Result<JwtValidator> {
        let validator = match (&self.public_key_pem, &self.secret) {
            (Some(pem), _) => JwtValidator::rs256_pem(pem).context("Invalid JWT_PUBLIC_KEY_PEM")?,
            (None, Some(secret)) => JwtValidator::hs256(secret.as_bytes()),
            (None, None) => anyhow::bail!("JWT_PUBLIC_KEY_PEM or JWT_SECRET must be set"),
        };
        let mut validator = validator.with_leeway(self.leeway_secs);
        if let Some(issuer) = &self.issuer {
            validator = validator.with_issuer(issuer);
        }
        if let Some(audience) = &self.audience {
            validator = validator.with_audience(audience);
        }
        Ok(validator)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            host: var_or("APP_HOST", "0.0.0.0"),
            port: parse_var("APP_PORT", "8080")?,
            registry_url: var_or("REGISTRY_URL", "http://127.0.0.1:8761"),
            routes_file: var_or("GATEWAY_ROUTES_FILE", "config/routes.toml"),
            max_body_bytes: parse_var("GATEWAY_MAX_BODY_BYTES", "10485760")?,
            jwt: JwtConfig::from_env()?,
            forward: with_overrides(presets::gateway_forward_config(), "GATEWAY_FORWARD_TIMEOUT_MS")?,
            aggregator: AggregatorConfig::from_env()?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RoutesFile {
    #[serde(default)]
    routes: Vec<RouteEntry>,
}

/// Read the route table from a TOML file of `[[routes]]` entries
pub fn load_routes(path: &str) -> Result<RouteTable> {
    if !Path::new(path).exists() {
        info!(path = %path, "Routes file not found; using built-in route table");
        return Ok(RouteTable::default_table());
    }

    let settings = config::Config::builder()
        .add_source(config::File::new(path, config::FileFormat::Toml))
        .build()
        .with_context(|| format!("Failed to read routes file {}", path))?;
    let file: RoutesFile = settings
        .try_deserialize()
        .with_context(|| format!("Invalid routes file {}", path))?;

    if file.routes.is_empty() {
        warn!(path = %path, "Routes file declares no routes; using built-in route table");
        return Ok(RouteTable::default_table());
    }

    let table = RouteTable::from_entries(file.routes)?;
    info!(path = %path, routes = table.len(), "Route table loaded");
    Ok(table)
}
