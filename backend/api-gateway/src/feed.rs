//! Feed routes served in-process by the aggregator
//!
//! Mirrors the feed service's endpoints: the route prefix itself is the
//! shared feed, `{prefix}/authors/{authorId}` is one author's feed, and
//! `POST {prefix}/invalidations` purges the pages a write made stale. The
//! gateway's aggregator has its own cache, so writes must be reported here.

use actix_web::http::Method;
use actix_web::{web, HttpRequest, HttpResponse};
use crypto_core::{CorrelationId, Principal};
use feed_service::models::FeedQuery;
use feed_service::{feed_response, FeedAggregator, Pagination, RequestContext, WriteEvent};
use murmur_common::ServiceError;

use crate::routes::RouteRule;

enum FeedRoute<'a> {
    Global,
    Author(&'a str),
    Invalidations,
}

impl FeedRoute<'_> {
    fn method(&self) -> Method {
        match self {
            FeedRoute::Invalidations => Method::POST,
            _ => Method::GET,
        }
    }
}

fn parse(remainder: &str) -> Option<FeedRoute<'_>> {
    let rest = remainder.trim_end_matches('/');
    if rest.is_empty() {
        return Some(FeedRoute::Global);
    }
    if rest == "/invalidations" {
        return Some(FeedRoute::Invalidations);
    }
    rest.strip_prefix("/authors/")
        .filter(|author| !author.is_empty() && !author.contains('/'))
        .map(FeedRoute::Author)
}

pub async fn serve(
    aggregator: &FeedAggregator,
    rule: &RouteRule,
    req: &HttpRequest,
    body: &web::Bytes,
    principal: Option<Principal>,
    correlation: &CorrelationId,
) -> Result<HttpResponse, ServiceError> {
    let route = rule
        .remainder(req.path())
        .and_then(parse)
        .filter(|route| req.method() == route.method())
        .ok_or_else(|| {
            ServiceError::NotFound(format!("no feed operation for {} {}", req.method(), req.path()))
        })?;

    match route {
        FeedRoute::Invalidations => invalidate(aggregator, body).await,
        FeedRoute::Global => read(aggregator, None, req, principal, correlation).await,
        FeedRoute::Author(author) => {
            read(aggregator, Some(author), req, principal, correlation).await
        }
    }
}

async fn read(
    aggregator: &FeedAggregator,
    author: Option<&str>,
    req: &HttpRequest,
    principal: Option<Principal>,
    correlation: &CorrelationId,
) -> Result<HttpResponse, ServiceError> {
    let principal = principal
        .ok_or_else(|| ServiceError::Unauthorized("feed requires an authenticated principal".into()))?;
    let ctx = RequestContext::from_principal(&principal, correlation.clone());

    let query = web::Query::<FeedQuery>::from_query(req.query_string())
        .map_err(|e| ServiceError::Validation(e.to_string()))?;
    let page = Pagination::from(query.into_inner());

    let feed = match author {
        None => aggregator.get_feed(&ctx, &page).await?,
        Some(author) => aggregator.get_author_feed(&ctx, author, &page).await?,
    };
    Ok(feed_response(feed))
}

async fn invalidate(aggregator: &FeedAggregator, body: &[u8]) -> Result<HttpResponse, ServiceError> {
    let event: WriteEvent = serde_json::from_slice(body)
        .map_err(|e| ServiceError::Validation(format!("invalid write event: {}", e)))?;
    let report = aggregator.invalidator().apply(&event).await?;
    Ok(HttpResponse::Ok().json(report))
}
