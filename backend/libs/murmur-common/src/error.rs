//! Unified error handling for all Murmur services
//!
//! Provides the error taxonomy shared by the gateway, the aggregator and
//! the discovery service so a failure keeps its meaning across boundaries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for Murmur services
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Unified error type for inter-service communication
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error_type", content = "details")]
pub enum ServiceError {
    /// Missing or malformed credential
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Credential present but signature invalid, expired or revoked
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// No route, or no registry entry
    #[error("Not found: {0}")]
    NotFound(String),

    /// No healthy instance, or circuit open with no fallback
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Downstream call failed and is not individually recoverable
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Invalid request
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::ServiceUnavailable(_) => 503,
            Self::Upstream(_) => 502,
            Self::Validation(_) => 400,
            Self::Internal(_) => 500,
        }
    }

    /// Stable machine-readable name, used in response bodies and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Upstream(_) => "upstream_error",
            Self::Validation(_) => "validation",
            Self::Internal(_) => "internal",
        }
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable(_) | Self::Upstream(_))
    }
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        ServiceError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Internal(format!("serialization failed: {}", err))
    }
}

/// JSON body returned to clients for any `ServiceError`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub error_type: String,
    pub status: u16,
}

impl From<&ServiceError> for ErrorBody {
    fn from(err: &ServiceError) -> Self {
        Self {
            error: err.to_string(),
            error_type: err.kind().to_string(),
            status: err.status_code(),
        }
    }
}

#[cfg(feature = "http")]
impl actix_web::ResponseError for ServiceError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        actix_web::http::StatusCode::from_u16(ServiceError::status_code(self))
            .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> actix_web::HttpResponse {
        actix_web::HttpResponse::build(actix_web::ResponseError::status_code(self))
            .json(ErrorBody::from(self))
    }
}
