//! API gateway middleware

pub mod jwt;

pub use jwt::{Authenticator, JwtMiddleware};
