use actix_web::{web, App, HttpServer};
use murmur_common::observability::{self, ServiceInfo};
use service_registry::InMemoryRegistry;
use std::io;
use std::sync::Arc;
use tracing::info;

use discovery_service::config::Config;
use discovery_service::{configure_routes, RegistryState};

#[actix_web::main]
async fn main() -> io::Result<()> {
    observability::init_tracing();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Configuration loading failed: {:#}", e);
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Starting discovery-service v{} (lease {:?}, sweep every {:?})",
        env!("CARGO_PKG_VERSION"),
        config.lease,
        config.sweep_interval
    );

    let registry = Arc::new(InMemoryRegistry::new(config.lease));
    let sweeper = registry.spawn_eviction_sweeper(config.sweep_interval);

    let state = web::Data::new(RegistryState {
        registry: registry.clone(),
    });

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(tracing_actix_web::TracingLogger::default())
            .configure(observability::configure(ServiceInfo {
                name: "discovery-service",
                version: env!("CARGO_PKG_VERSION"),
            }))
            .configure(configure_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run();

    info!("HTTP server listening on {}:{}", config.host, config.port);
    let result = server.await;
    sweeper.abort();
    result
}
