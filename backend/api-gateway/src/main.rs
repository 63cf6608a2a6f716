use actix_web::{web, App, HttpServer};
use murmur_common::observability::{self, ServiceInfo};
use resilience::ResilienceRegistry;
use service_registry::{RemoteRegistry, SharedRegistry};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use api_gateway::config::{load_routes, Config};
use api_gateway::{dispatch, Authenticator, GatewayState, JwtMiddleware};

fn exit_with(message: &str, err: impl std::fmt::Display) -> ! {
    tracing::error!("{}: {}", message, err);
    eprintln!("ERROR: {}: {}", message, err);
    std::process::exit(1);
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    observability::init_tracing();

    info!("Starting api-gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => exit_with("Failed to load configuration", format!("{:#}", e)),
    };

    let routes = match load_routes(&config.routes_file) {
        Ok(routes) => Arc::new(routes),
        Err(e) => exit_with("Failed to load route table", format!("{:#}", e)),
    };

    let validator = match config.jwt.validator() {
        Ok(validator) => validator,
        Err(e) => exit_with("Failed to initialize JWT validation", format!("{:#}", e)),
    };
    info!(
        algorithm = if config.jwt.public_key_pem.is_some() { "RS256" } else { "HS256" },
        issuer = ?config.jwt.issuer,
        "JWT validation configured"
    );

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

    let feed = Arc::new(config.aggregator.build(registry.clone(), http.clone(), cache.clone()));
    let authenticator = Authenticator::new(validator).with_revocations(cache);

    let state = web::Data::new(GatewayState {
        routes: routes.clone(),
        registry,
        http,
        breakers: ResilienceRegistry::new(config.forward.clone()),
        feed,
    });

    let max_body = config.max_body_bytes;
    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(max_body))
            .wrap(JwtMiddleware::new(authenticator.clone(), routes.clone()))
            .wrap(tracing_actix_web::TracingLogger::default())
            .configure(observability::configure(ServiceInfo {
                name: "api-gateway",
                version: env!("CARGO_PKG_VERSION"),
            }))
            .default_service(web::to(dispatch))
    })
    .bind((config.host.as_str(), config.port))?
    .run();

    info!("API gateway listening on {}:{}", config.host, config.port);
    server.await
}
