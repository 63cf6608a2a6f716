//! Unified cache key schema
//!
//! All services must use these key generators to ensure consistency.
//! Key format: v{VERSION}:{entity}:{scope}[:sub_key]
//!
//! Keys that must be purged together share a prefix, so a write can
//! invalidate every page of a feed with one prefix invalidation.
//!
//! Caller-supplied parts (author ids, cursors, token ids) are
//! percent-encoded, so they never contain the `:` separator and two
//! different inputs never produce the same key or prefix.

use std::borrow::Cow;

/// Cache schema version - increment when changing key formats
pub const CACHE_VERSION: u32 = 1;

/// Placeholder for "first page" in paginated keys
const NO_CURSOR: &str = "-";

/// Encode one caller-supplied key part
fn part(raw: &str) -> Cow<'_, str> {
    match raw {
        // `-` survives encoding and would read as "first page"
        NO_CURSOR => Cow::Borrowed("%2D"),
        _ => urlencoding::encode(raw),
    }
}

fn cursor_part(cursor: Option<&str>) -> Cow<'_, str> {
    cursor.map_or(Cow::Borrowed(NO_CURSOR), part)
}

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    // ============= Feed Keys =============

    /// One page of the shared feed
    /// Format: v1:feed:global:{cursor}:{limit}
    pub fn feed_page(cursor: Option<&str>, limit: u32) -> String {
        format!(
            "{}{}:{}",
            Self::feed_prefix(),
            cursor_part(cursor),
            limit
        )
    }

    /// Prefix covering every page of the shared feed
    pub fn feed_prefix() -> String {
        format!("v{}:feed:global:", CACHE_VERSION)
    }

    /// One page of a single author's feed
    /// Format: v1:feed:author:{author_id}:{cursor}:{limit}
    pub fn author_feed_page(author_id: &str, cursor: Option<&str>, limit: u32) -> String {
        format!(
            "{}{}:{}",
            Self::author_feed_prefix(author_id),
            cursor_part(cursor),
            limit
        )
    }

    /// Prefix covering every page of one author's feed
    pub fn author_feed_prefix(author_id: &str) -> String {
        format!("v{}:feed:author:{}:", CACHE_VERSION, part(author_id))
    }

    // ============= Token Keys =============

    /// Revoked token marker
    /// Format: v1:token:revoked:{jti}
    pub fn revoked_token(jti: &str) -> String {
        format!("v{}:token:revoked:{}", CACHE_VERSION, part(jti))
    }
}
