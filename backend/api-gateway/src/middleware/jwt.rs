//! Bearer authentication for routes that require it
//!
//! Runs before dispatch: the matched route decides whether a token is
//! needed. A verified `Principal` is stored in the request extensions for
//! the dispatcher; failures end the request here with `401`/`403`.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderValue, AUTHORIZATION},
    Error, HttpMessage,
};
use crypto_core::{CorrelationId, JwtValidator, Principal};
use futures_util::future::LocalBoxFuture;
use murmur_cache::{Cache, CacheKey};
use murmur_common::headers::CORRELATION_ID;
use murmur_common::ServiceError;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::metrics::record_request;
use crate::routes::RouteTable;

/// Paths served by the gateway itself
fn is_unguarded(path: &str) -> bool {
    path == "/health" || path == "/metrics"
}

/// Token verification plus revocation lookup
#[derive(Clone)]
pub struct Authenticator {
    validator: Arc<JwtValidator>,
    revocations: Option<Cache>,
}

impl Authenticator {
    pub fn new(validator: JwtValidator) -> Self {
        Self {
            validator: Arc::new(validator),
            revocations: None,
        }
    }

    /// Reject tokens whose `jti` is marked revoked in `cache`
    pub fn with_revocations(mut self, cache: Cache) -> Self {
        self.revocations = Some(cache);
        self
    }

    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<Principal, ServiceError> {
        let principal = self.validator.validate_header(authorization)?;

        if let (Some(cache), Some(jti)) = (&self.revocations, principal.token_id()) {
            match cache.contains(&CacheKey::revoked_token(jti)).await {
                Ok(true) => {
                    return Err(ServiceError::Forbidden("token has been revoked".into()));
                }
                Ok(false) => {}
                // Revocation store down: verified tokens are still honoured
                Err(e) => warn!(error = %e, "Revocation lookup failed"),
            }
        }
        Ok(principal)
    }
}

/// JWT authentication middleware
pub struct JwtMiddleware {
    authenticator: Authenticator,
    routes: Arc<RouteTable>,
}

impl JwtMiddleware {
    pub fn new(authenticator: Authenticator, routes: Arc<RouteTable>) -> Self {
        Self {
            authenticator,
            routes,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            authenticator: self.authenticator.clone(),
            routes: self.routes.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    authenticator: Authenticator,
    routes: Arc<RouteTable>,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let correlation = CorrelationId::from_header_or_generate(
            req.headers()
                .get(CORRELATION_ID)
                .and_then(|v| v.to_str().ok()),
        );
        req.extensions_mut().insert(correlation.clone());

        let service = Rc::clone(&self.service);
        let guarded = if is_unguarded(req.path()) {
            None
        } else {
            self.routes
                .find(req.path())
                .filter(|rule| rule.requires_auth)
                .map(|rule| rule.path_prefix.clone())
        };

        let Some(route) = guarded else {
            return Box::pin(async move {
                service.call(req).await.map(ServiceResponse::map_into_left_body)
            });
        };

        let authenticator = self.authenticator.clone();
        Box::pin(async move {
            // An undecodable header is malformed, not missing
            let authorization = req
                .headers()
                .get(AUTHORIZATION)
                .map(|v| v.to_str().unwrap_or_default().to_string());

            match authenticator.authenticate(authorization.as_deref()).await {
                Ok(principal) => {
                    debug!(subject_id = %principal.subject_id, route = %route, "Request authenticated");
                    req.extensions_mut().insert(principal);
                    service.call(req).await.map(ServiceResponse::map_into_left_body)
                }
                Err(err) => {
                    info!(route = %route, error = %err, "Request rejected");
                    let mut response = req.error_response(err);
                    if let Ok(value) = HeaderValue::from_str(correlation.as_str()) {
                        response.headers_mut().insert(
                            actix_web::http::header::HeaderName::from_static(CORRELATION_ID),
                            value,
                        );
                    }
                    record_request(&route, response.status().as_u16());
                    Ok(response.map_into_right_body())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::RouteRule;
    use actix_web::{test, web, App, HttpRequest, HttpResponse};
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use murmur_common::ManualClock;
    use serde_json::json;
    use std::time::Duration;

    const SECRET: &str = "test-secret";

    fn create_test_jwt(sub: &str, expires_in_seconds: i64, secret: &str) -> String {
        let now = chrono::Utc::now().timestamp();
        encode(
            &Header::new(Algorithm::HS256),
            &json!({"sub": sub, "exp": now + expires_in_seconds, "iat": now, "jti": format!("jti-{}", sub)}),
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    async fn whoami(req: HttpRequest) -> HttpResponse {
        let subject = req
            .extensions()
            .get::<Principal>()
            .map(|p| p.subject_id.clone())
            .unwrap_or_else(|| "anonymous".into());
        HttpResponse::Ok().body(subject)
    }

    fn routes() -> Arc<RouteTable> {
        Arc::new(RouteTable::new(vec![
            RouteRule::service("/private", "svc").unwrap(),
            RouteRule::service("/open", "svc").unwrap().public(),
        ]))
    }

    fn authenticator() -> Authenticator {
        Authenticator::new(JwtValidator::hs256(SECRET.as_bytes()))
    }

    macro_rules! app {
        ($auth:expr) => {
            test::init_service(
                App::new()
                    .wrap(JwtMiddleware::new($auth, routes()))
                    .default_service(web::to(whoami)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_valid_jwt_allows_access() {
        let app = app!(authenticator());
        let req = test::TestRequest::get()
            .uri("/private/thing")
            .insert_header(("Authorization", format!("Bearer {}", create_test_jwt("user-123", 3600, SECRET))))
            .to_request();

        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "user-123");
    }

    #[actix_web::test]
    async fn test_missing_or_malformed_header_is_401() {
        let app = app!(authenticator());

        let req = test::TestRequest::get().uri("/private").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
        assert!(resp.headers().contains_key(CORRELATION_ID));

        let req = test::TestRequest::get()
            .uri("/private")
            .insert_header(("Authorization", "Basic dXNlcjpwdw=="))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);

        let req = test::TestRequest::get()
            .uri("/private")
            .insert_header(("Authorization", "Bearer not-a-jwt"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);
    }

    #[actix_web::test]
    async fn test_expired_or_forged_jwt_is_403() {
        let app = app!(authenticator());

        let req = test::TestRequest::get()
            .uri("/private")
            .insert_header(("Authorization", format!("Bearer {}", create_test_jwt("u", -3600, SECRET))))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);

        let req = test::TestRequest::get()
            .uri("/private")
            .insert_header(("Authorization", format!("Bearer {}", create_test_jwt("u", 3600, "other-secret"))))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);
    }

    #[actix_web::test]
    async fn test_public_unmatched_and_health_bypass_auth() {
        let app = app!(authenticator());
        for uri in ["/open/login", "/unrouted", "/health"] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let body = test::call_and_read_body(&app, req).await;
            assert_eq!(body, "anonymous", "{uri}");
        }
    }

    #[actix_web::test]
    async fn test_revoked_token_is_403() {
        let clock = ManualClock::starting_now();
        let cache = Cache::memory(clock.shared());
        cache
            .put(&CacheKey::revoked_token("jti-mallory"), &true, Duration::from_secs(600))
            .await
            .unwrap();
        let app = app!(authenticator().with_revocations(cache));

        let req = test::TestRequest::get()
            .uri("/private")
            .insert_header(("Authorization", format!("Bearer {}", create_test_jwt("mallory", 3600, SECRET))))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);

        let req = test::TestRequest::get()
            .uri("/private")
            .insert_header(("Authorization", format!("Bearer {}", create_test_jwt("alice", 3600, SECRET))))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
    }
}
