use actix_web::{web, App, HttpServer};
use murmur_common::observability::{self, ServiceInfo};
use service_registry::{Registration, RegistrationAgent, RemoteRegistry, SharedRegistry};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use feed_service::config::Config;
use feed_service::{configure_routes, FeedState};

fn exit_with(message: &str, err: impl std::fmt::Display) -> ! {
    tracing::error!("{}: {}", message, err);
    eprintln!("ERROR: {}: {}", message, err);
    std::process::exit(1);
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    observability::init_tracing();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => exit_with("Failed to load configuration", format!("{:#}", e)),
    };

    info!("Starting feed-service v{}", env!("CARGO_PKG_VERSION"));

    let cache = match config
        .aggregator
        .cache_backend
        .connect(config.aggregator.cache_sweep_interval)
        .await
    {
        Ok(cache) => cache,
        Err(e) => exit_with("Failed to initialize cache", format!("{:#}", e)),
    };

    if let Err(e) = murmur_cache::CacheMetrics::register(prometheus::default_registry()) {
        tracing::warn!(error = %e, "Failed to register cache metrics");
    }

    let registry: SharedRegistry = match RemoteRegistry::new(&config.registry_url) {
        Ok(remote) => Arc::new(remote),
        Err(e) => exit_with("Failed to build registry client", e),
    };

    let http = match reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
    {
        Ok(client) => client,
        Err(e) => exit_with("Failed to build HTTP client", e),
    };

    let aggregator = Arc::new(config.aggregator.build(registry.clone(), http, cache));
    let state = web::Data::new(FeedState {
        invalidator: aggregator.invalidator(),
        aggregator,
    });

    let agent = RegistrationAgent::new(
        registry,
        Registration::new(
            "feed-service",
            config.advertised_host.clone(),
            config.port,
            config.instance_id.clone(),
        ),
        config.heartbeat_interval,
    )
    .spawn();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(tracing_actix_web::TracingLogger::default())
            .configure(observability::configure(ServiceInfo {
                name: "feed-service",
                version: env!("CARGO_PKG_VERSION"),
            }))
            .configure(configure_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run();

    info!("HTTP server listening on {}:{}", config.host, config.port);
    let result = server.await;
    agent.shutdown().await;
    result
}
