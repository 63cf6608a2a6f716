//! Correlation ID utilities for distributed tracing
//!
//! The gateway accepts a caller-supplied `X-Correlation-ID` when it looks
//! sane, generates one otherwise, and forwards it to every upstream so log
//! lines from one request can be joined across services.

use std::fmt;
use uuid::Uuid;

pub use murmur_common::headers::CORRELATION_ID as HTTP_CORRELATION_ID_HEADER;

const MAX_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a new random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Reuse the inbound header value if it is safe to log and forward
    pub fn from_header_or_generate(value: Option<&str>) -> Self {
        value
            .map(str::trim)
            .filter(|v| is_acceptable(v))
            .map(|v| Self(v.to_string()))
            .unwrap_or_else(Self::generate)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_acceptable(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}
