//! API gateway library
//! Re-exports modules for testing and integration

pub mod config;
pub mod feed;
pub mod metrics;
pub mod middleware;
pub mod proxy;
pub mod routes;
pub mod state;

pub use middleware::{Authenticator, JwtMiddleware};
pub use proxy::dispatch;
pub use routes::{RouteRule, RouteTable, RouteTarget};
pub use state::GatewayState;
