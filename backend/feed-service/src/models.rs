//! Wire and domain types for feed aggregation

use chrono::{DateTime, Utc};
use murmur_common::ids::string_or_number;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page request as received from the client
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedQuery {
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

/// Normalized pagination: empty cursor means first page, limit clamped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub cursor: Option<String>,
    pub limit: u32,
}

impl Pagination {
    pub fn new(cursor: Option<String>, limit: Option<u32>) -> Self {
        Self {
            cursor: cursor.filter(|c| !c.trim().is_empty()),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }
}

impl From<FeedQuery> for Pagination {
    fn from(q: FeedQuery) -> Self {
        Pagination::new(q.cursor, q.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(deserialize_with = "string_or_number")]
    pub comment_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub author_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Post as returned by the content service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub post_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub author_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub like_count: u64,
}

/// Content service page; a bare array is accepted as a page without cursor
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PostsResponse {
    Page {
        posts: Vec<PostRecord>,
        #[serde(default, rename = "nextCursor")]
        next_cursor: Option<String>,
    },
    List(Vec<PostRecord>),
}

impl PostsResponse {
    pub fn into_parts(self) -> (Vec<PostRecord>, Option<String>) {
        match self {
            PostsResponse::Page { posts, next_cursor } => (posts, next_cursor),
            PostsResponse::List(posts) => (posts, None),
        }
    }
}

/// Identity service batch request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchLookup {
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub display_name: String,
}

/// authorId -> identity
pub type IdentityMap = HashMap<String, Identity>;

/// One merged entry of the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub post_id: String,
    pub author_id: String,
    pub author_display_name: Option<String>,
    /// Identity could not be resolved; the post is kept anyway
    pub author_unknown: bool,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub comments: Vec<Comment>,
    pub like_count: u64,
}

impl FeedItem {
    pub fn merge(post: PostRecord, identity: Option<&Identity>) -> Self {
        Self {
            author_display_name: identity.map(|i| i.display_name.clone()),
            author_unknown: identity.is_none(),
            post_id: post.post_id,
            author_id: post.author_id,
            content: post.content,
            created_at: post.created_at,
            comments: post.comments,
            like_count: post.like_count,
        }
    }
}

/// Aggregated page, the unit stored in the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_defaults_and_clamps() {
        assert_eq!(Pagination::new(None, None).limit, DEFAULT_PAGE_SIZE);
        assert_eq!(Pagination::new(None, Some(0)).limit, 1);
        assert_eq!(Pagination::new(None, Some(10_000)).limit, MAX_PAGE_SIZE);
        assert_eq!(Pagination::new(Some("  ".into()), None).cursor, None);
    }

    #[test]
    fn test_posts_response_accepts_array_and_page() {
        let list: PostsResponse = serde_json::from_str(
            r#"[{"postId": 1, "authorId": 2, "content": "hi", "createdAt": "2026-01-01T00:00:00Z"}]"#,
        )
        .unwrap();
        let (posts, cursor) = list.into_parts();
        assert_eq!(posts[0].post_id, "1");
        assert_eq!(posts[0].author_id, "2");
        assert!(posts[0].comments.is_empty());
        assert_eq!(cursor, None);

        let page: PostsResponse = serde_json::from_str(
            r#"{"posts": [], "nextCursor": "abc"}"#,
        )
        .unwrap();
        assert_eq!(page.into_parts().1.as_deref(), Some("abc"));
    }

    #[test]
    fn test_merge_without_identity_marks_unknown() {
        let post = PostRecord {
            post_id: "p".into(),
            author_id: "a".into(),
            content: "c".into(),
            created_at: Utc::now(),
            comments: vec![],
            like_count: 3,
        };
        let item = FeedItem::merge(post, None);
        assert!(item.author_unknown);
        assert_eq!(item.author_display_name, None);
        assert_eq!(item.like_count, 3);

        let json = serde_json::to_value(&item).unwrap();
        assert!(json["authorDisplayName"].is_null());
        assert_eq!(json["authorUnknown"], true);
    }
}
