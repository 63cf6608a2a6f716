use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Instances silent for longer than this are no longer resolved
    pub lease: Duration,
    pub sweep_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("APP_PORT")
                .unwrap_or_else(|_| "8761".to_string())
                .parse()
                .context("APP_PORT must be a port number")?,
            lease: Duration::from_secs(
                std::env::var("REGISTRY_LEASE_SECS")
                    .unwrap_or_else(|_| "90".to_string())
                    .parse()
                    .context("REGISTRY_LEASE_SECS must be a number of seconds")?,
            ),
            sweep_interval: Duration::from_secs(
                std::env::var("REGISTRY_SWEEP_INTERVAL_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .context("REGISTRY_SWEEP_INTERVAL_SECS must be a number of seconds")?,
            ),
        })
    }
}
