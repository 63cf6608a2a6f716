//! Per-request caller context
//!
//! Built by whoever authenticated the request and passed by value into the
//! aggregator; nothing is read from ambient state.

use actix_web::{dev::Payload, FromRequest, HttpRequest};
use crypto_core::{CorrelationId, Principal};
use murmur_common::headers::{CORRELATION_ID, PRINCIPAL_SUBJECT};
use murmur_common::ServiceError;
use std::future::{ready, Ready};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub subject_id: String,
    pub correlation_id: CorrelationId,
}

impl RequestContext {
    pub fn new(subject_id: impl Into<String>, correlation_id: CorrelationId) -> Self {
        Self {
            subject_id: subject_id.into(),
            correlation_id,
        }
    }

    pub fn from_principal(principal: &Principal, correlation_id: CorrelationId) -> Self {
        Self::new(principal.subject_id.clone(), correlation_id)
    }
}

/// Reads the principal the gateway injected; requests without one are refused
impl FromRequest for RequestContext {
    type Error = ServiceError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        let result = match header(PRINCIPAL_SUBJECT).filter(|s| !s.trim().is_empty()) {
            Some(subject) => Ok(RequestContext::new(
                subject,
                CorrelationId::from_header_or_generate(header(CORRELATION_ID).as_deref()),
            )),
            None => Err(ServiceError::Unauthorized(
                "missing authenticated principal".to_string(),
            )),
        };
        ready(result)
    }
}
