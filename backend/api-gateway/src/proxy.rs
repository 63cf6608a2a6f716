//! Request dispatch
//!
//! Every request not served by the gateway itself lands here: match a
//! route, then either forward to a registry-resolved instance or hand the
//! request to the in-process aggregator. Principal headers are written by
//! the gateway only; any a client sends are dropped, and any an upstream
//! returns never reach the client.

use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::http::StatusCode;
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, ResponseError};
use crypto_core::{CorrelationId, Principal};
use murmur_common::headers::{is_principal_header, CORRELATION_ID, PRINCIPAL_EXPIRES_AT, PRINCIPAL_SUBJECT};
use murmur_common::ServiceError;
use resilience::{CallError, CallKind};
use tracing::{debug, warn};

use crate::feed;
use crate::metrics::{record_request, UNMATCHED_ROUTE};
use crate::routes::{RouteRule, RouteTarget};
use crate::state::GatewayState;

/// Connection-scoped headers that must not be relayed
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Default service: route and dispatch any request
pub async fn dispatch(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<GatewayState>,
) -> HttpResponse {
    let correlation = req
        .extensions()
        .get::<CorrelationId>()
        .cloned()
        .unwrap_or_else(|| {
            CorrelationId::from_header_or_generate(
                req.headers().get(CORRELATION_ID).and_then(|v| v.to_str().ok()),
            )
        });
    let principal = req.extensions().get::<Principal>().cloned();

    let (route, result) = match state.routes.find(req.path()) {
        None => (
            UNMATCHED_ROUTE.to_string(),
            Err(ServiceError::NotFound(format!("no route for {}", req.path()))),
        ),
        Some(rule) => {
            let result = if rule.requires_auth && principal.is_none() {
                Err(ServiceError::Unauthorized("authentication required".into()))
            } else {
                match &rule.target {
                    RouteTarget::Aggregator => {
                        feed::serve(&state.feed, rule, &req, &body, principal, &correlation).await
                    }
                    RouteTarget::Service(service) => {
                        forward(&state, rule, service, &req, body, principal.as_ref(), &correlation)
                            .await
                    }
                }
            };
            (rule.path_prefix.clone(), result)
        }
    };

    let mut response = result.unwrap_or_else(|err| {
        debug!(route = %route, error = %err, "Request failed at gateway");
        err.error_response()
    });
    if let Ok(value) = HeaderValue::from_str(correlation.as_str()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(CORRELATION_ID), value);
    }
    record_request(&route, response.status().as_u16());
    response
}

/// Headers for the upstream request: client headers minus hop-by-hop and
/// principal headers, plus the gateway's principal and correlation id
fn upstream_headers(
    req: &HttpRequest,
    rule: &RouteRule,
    principal: Option<&Principal>,
    correlation: &CorrelationId,
) -> Result<reqwest::header::HeaderMap, ServiceError> {
    use reqwest::header::{HeaderMap, HeaderName as UpName, HeaderValue as UpValue};

    let mut headers = HeaderMap::new();
    for (name, value) in req.headers() {
        let name = name.as_str();
        if is_hop_by_hop(name) || is_principal_header(name) || name == CORRELATION_ID {
            continue;
        }
        if rule.internal && principal.is_some() && name == "authorization" {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            UpName::from_bytes(name.as_bytes()),
            UpValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }

    if let Some(principal) = principal {
        let subject = UpValue::from_str(&principal.subject_id)
            .map_err(|_| ServiceError::Forbidden("subject cannot be forwarded".into()))?;
        headers.insert(UpName::from_static(PRINCIPAL_SUBJECT), subject);
        headers.insert(
            UpName::from_static(PRINCIPAL_EXPIRES_AT),
            UpValue::from(principal.expires_at.timestamp()),
        );
    }
    if let Ok(value) = UpValue::from_str(correlation.as_str()) {
        headers.insert(UpName::from_static(CORRELATION_ID), value);
    }
    Ok(headers)
}

fn forward_error(err: CallError<reqwest::Error>) -> ServiceError {
    match err {
        CallError::ShortCircuited { dependency } => {
            ServiceError::ServiceUnavailable(format!("{} circuit open", dependency))
        }
        CallError::TimedOut { dependency, after } => {
            ServiceError::ServiceUnavailable(format!("{} did not answer within {:?}", dependency, after))
        }
        CallError::Failed { dependency, error } => {
            ServiceError::Upstream(format!("{}: {}", dependency, error))
        }
    }
}

async fn forward(
    state: &GatewayState,
    rule: &RouteRule,
    service: &str,
    req: &HttpRequest,
    body: web::Bytes,
    principal: Option<&Principal>,
    correlation: &CorrelationId,
) -> Result<HttpResponse, ServiceError> {
    let instance = state
        .registry
        .resolve(service)
        .await
        .map_err(|e| ServiceError::ServiceUnavailable(format!("registry unavailable: {}", e)))?
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::ServiceUnavailable(format!("no healthy instance of {}", service)))?;

    let mut url = format!("{}{}", instance.base_url(), rule.upstream_path(req.path()));
    if !req.query_string().is_empty() {
        url.push('?');
        url.push_str(req.query_string());
    }

    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|e| ServiceError::Validation(format!("unsupported method: {}", e)))?;
    let headers = upstream_headers(req, rule, principal, correlation)?;
    let kind = CallKind::from_method(req.method().as_str());

    debug!(
        service = %service,
        instance_id = %instance.instance_id,
        method = %method,
        url = %url,
        "Forwarding request"
    );

    let upstream = state
        .breakers
        .get(service)
        .call(kind, || {
            state
                .http
                .request(method.clone(), url.as_str())
                .headers(headers.clone())
                .body(body.clone())
                .send()
        })
        .await
        .map_err(forward_error)?;

    let status = StatusCode::from_u16(upstream.status().as_u16())
        .map_err(|e| ServiceError::Upstream(format!("invalid upstream status: {}", e)))?;
    let mut response = HttpResponse::build(status);
    for (name, value) in upstream.headers() {
        let name = name.as_str();
        if is_hop_by_hop(name) || is_principal_header(name) {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            (Ok(name), Ok(value)) => {
                response.append_header((name, value));
            }
            _ => warn!(header = %name, "Dropping unrepresentable upstream header"),
        }
    }

    let payload = upstream
        .bytes()
        .await
        .map_err(|e| ServiceError::Upstream(format!("{}: reading response failed: {}", service, e)))?;
    Ok(response.body(payload))
}
