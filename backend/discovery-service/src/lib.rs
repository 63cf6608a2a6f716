//! Discovery service
//!
//! HTTP front for an in-memory lease registry. Services register on
//! startup, heartbeat to keep their lease, and everyone else resolves
//! them by name.

pub mod config;
pub mod handlers;

use actix_web::{error::JsonPayloadError, web, HttpRequest};
use murmur_common::ServiceError;

pub use handlers::RegistryState;

/// Malformed JSON bodies use the shared error format
fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ServiceError::Validation(err.to_string()).into()
}

/// Mount the registration protocol
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .route("/register", web::post().to(handlers::register))
        .route("/heartbeat/{instance_id}", web::post().to(handlers::heartbeat))
        .route("/instance/{instance_id}", web::delete().to(handlers::deregister))
        .route(
            "/instance/{instance_id}/status",
            web::put().to(handlers::set_status),
        )
        .route("/services", web::get().to(handlers::list_services))
        .route("/services/{service_name}", web::get().to(handlers::resolve));
}
