use feed_service::FeedAggregator;
use resilience::ResilienceRegistry;
use service_registry::SharedRegistry;
use std::sync::Arc;

use crate::routes::RouteTable;

/// Everything a gateway worker needs; holds no per-user state, so any
/// number of gateways can share one registry
pub struct GatewayState {
    pub routes: Arc<RouteTable>,
    pub registry: SharedRegistry,
    pub http: reqwest::Client,
    /// One circuit per forwarded service
    pub breakers: ResilienceRegistry,
    pub feed: Arc<FeedAggregator>,
}
