//! Feed HTTP handlers

use actix_web::error::{JsonPayloadError, QueryPayloadError};
use actix_web::{web, HttpRequest, HttpResponse};
use murmur_common::ServiceError;
use std::sync::Arc;

use crate::aggregator::FeedAggregator;
use crate::context::RequestContext;
use crate::invalidation::{FeedInvalidator, WriteEvent};
use crate::models::{FeedPage, FeedQuery, Pagination};

/// Response header carrying the cursor of the next page, absent on the last page
pub const NEXT_CURSOR_HEADER: &str = "x-next-cursor";

pub struct FeedState {
    pub aggregator: Arc<FeedAggregator>,
    pub invalidator: FeedInvalidator,
}

/// Render a page as a JSON array of items
pub fn feed_response(page: FeedPage) -> HttpResponse {
    let mut response = HttpResponse::Ok();
    if let Some(cursor) = &page.next_cursor {
        response.insert_header((NEXT_CURSOR_HEADER, cursor.as_str()));
    }
    response.json(page.items)
}

/// GET /feed
pub async fn get_feed(
    state: web::Data<FeedState>,
    ctx: RequestContext,
    query: web::Query<FeedQuery>,
) -> Result<HttpResponse, ServiceError> {
    let page = Pagination::from(query.into_inner());
    let feed = state.aggregator.get_feed(&ctx, &page).await?;
    Ok(feed_response(feed))
}

/// GET /feed/authors/{author_id}
pub async fn get_author_feed(
    state: web::Data<FeedState>,
    ctx: RequestContext,
    path: web::Path<String>,
    query: web::Query<FeedQuery>,
) -> Result<HttpResponse, ServiceError> {
    let page = Pagination::from(query.into_inner());
    let feed = state
        .aggregator
        .get_author_feed(&ctx, &path.into_inner(), &page)
        .await?;
    Ok(feed_response(feed))
}

/// POST /feed/invalidations
pub async fn invalidate(
    state: web::Data<FeedState>,
    body: web::Json<WriteEvent>,
) -> Result<HttpResponse, ServiceError> {
    let report = state.invalidator.apply(&body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(report))
}

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ServiceError::Validation(err.to_string()).into()
}

fn query_error(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ServiceError::Validation(err.to_string()).into()
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::QueryConfig::default().error_handler(query_error));
    cfg.service(
        web::scope("/feed")
            .route("", web::get().to(get_feed))
            .route("/authors/{author_id}", web::get().to(get_author_feed))
            .route("/invalidations", web::post().to(invalidate)),
    );
}
