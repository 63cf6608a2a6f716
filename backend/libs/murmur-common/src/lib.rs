//! Murmur Common Library
//!
//! Shared types used by every Murmur service and library:
//! the cross-service error taxonomy, the clock abstraction that lets
//! leases, TTLs and cooldowns run on synthetic time in tests, and a few
//! wire helpers.

pub mod clock;
pub mod error;
pub mod headers;
pub mod ids;
#[cfg(feature = "http")]
pub mod observability;

pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use error::{ErrorBody, Result, ServiceError};
