//! Feed service
//!
//! Aggregates the content service's posts with the identity service's
//! author names into a cached, paginated feed. The library is also linked
//! into the API gateway, which serves `/feed` in-process.

pub mod aggregator;
pub mod clients;
pub mod config;
pub mod context;
pub mod handlers;
pub mod invalidation;
pub mod metrics;
pub mod models;

pub use aggregator::{FeedAggregator, CONTENT_DEPENDENCY, IDENTITY_DEPENDENCY};
pub use clients::{
    ClientError, ContentSource, HttpContentClient, HttpIdentityClient, IdentitySource, PostQuery,
    RegistryHttp,
};
pub use context::RequestContext;
pub use handlers::{configure_routes, feed_response, FeedState};
pub use invalidation::{FeedInvalidator, WriteEpoch, WriteEvent, WriteKind};
pub use models::{FeedItem, FeedPage, Pagination};
