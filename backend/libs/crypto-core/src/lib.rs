//! Token verification and request correlation shared by Murmur services

pub mod correlation;
pub mod jwt;

pub use correlation::CorrelationId;
pub use jwt::{bearer_token, JwtError, JwtValidator, Principal};
