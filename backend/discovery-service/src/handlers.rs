//! Registration protocol endpoints

use actix_web::{web, HttpResponse};
use murmur_common::ServiceError;
use serde_json::json;
use service_registry::{RegisterResponse, Registration, SharedRegistry, StatusUpdate};
use tracing::debug;

pub struct RegistryState {
    pub registry: SharedRegistry,
}

/// POST /register
pub async fn register(
    state: web::Data<RegistryState>,
    body: web::Json<Registration>,
) -> Result<HttpResponse, ServiceError> {
    let instance_id = state.registry.register(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(RegisterResponse { instance_id }))
}

/// POST /heartbeat/{instance_id}
pub async fn heartbeat(
    state: web::Data<RegistryState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let instance_id = path.into_inner();
    state.registry.heartbeat(&instance_id).await?;
    debug!(instance_id = %instance_id, "Heartbeat received");
    Ok(HttpResponse::Ok().json(json!({ "status": "ok" })))
}

/// DELETE /instance/{instance_id}
pub async fn deregister(
    state: web::Data<RegistryState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    state.registry.deregister(&path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// PUT /instance/{instance_id}/status
pub async fn set_status(
    state: web::Data<RegistryState>,
    path: web::Path<String>,
    body: web::Json<StatusUpdate>,
) -> Result<HttpResponse, ServiceError> {
    state
        .registry
        .set_status(&path.into_inner(), body.status)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /services
pub async fn list_services(state: web::Data<RegistryState>) -> Result<HttpResponse, ServiceError> {
    let services = state.registry.list().await?;
    Ok(HttpResponse::Ok().json(services))
}

/// GET /services/{service_name}
pub async fn resolve(
    state: web::Data<RegistryState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let instances = state.registry.resolve(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(instances))
}
