//! Static route table
//!
//! Rules are plain data evaluated by one matching function: the longest
//! matching prefix wins, and between equal prefixes the first declared.
//! Prefixes match on path-segment boundaries, so `/feed` covers `/feed`
//! and `/feed/authors/7` but not `/feedback`.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    /// Forward to an instance resolved from the registry
    Service(String),
    /// Served in-process by the feed aggregator
    Aggregator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub path_prefix: String,
    pub target: RouteTarget,
    pub strip_prefix: bool,
    pub requires_auth: bool,
    /// Upstream never sees the caller's `Authorization` header once validated
    pub internal: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("route prefix '{0}' must start with '/'")]
    InvalidPrefix(String),

    #[error("route '{0}' must name exactly one of `service` or `aggregator`")]
    AmbiguousTarget(String),
}

/// A route as written in the routes file
#[derive(Debug, Clone, Deserialize)]
pub struct RouteEntry {
    pub path_prefix: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub aggregator: bool,
    #[serde(default)]
    pub strip_prefix: bool,
    #[serde(default = "default_requires_auth")]
    pub requires_auth: bool,
    #[serde(default)]
    pub internal: bool,
}

fn default_requires_auth() -> bool {
    true
}

impl TryFrom<RouteEntry> for RouteRule {
    type Error = RouteError;

    fn try_from(entry: RouteEntry) -> Result<Self, Self::Error> {
        let target = match (entry.service, entry.aggregator) {
            (Some(name), false) if !name.trim().is_empty() => RouteTarget::Service(name),
            (None, true) => RouteTarget::Aggregator,
            _ => return Err(RouteError::AmbiguousTarget(entry.path_prefix)),
        };
        let mut rule = RouteRule::new(&entry.path_prefix, target)?;
        rule.strip_prefix = entry.strip_prefix;
        rule.requires_auth = entry.requires_auth;
        rule.internal = entry.internal;
        Ok(rule)
    }
}

impl RouteRule {
    fn new(prefix: &str, target: RouteTarget) -> Result<Self, RouteError> {
        if !prefix.starts_with('/') {
            return Err(RouteError::InvalidPrefix(prefix.to_string()));
        }
        let trimmed = prefix.trim_end_matches('/');
        Ok(Self {
            path_prefix: if trimmed.is_empty() { "/".into() } else { trimmed.into() },
            target,
            strip_prefix: false,
            requires_auth: true,
            internal: false,
        })
    }

    /// Authenticated forward to `service`
    pub fn service(prefix: &str, service: &str) -> Result<Self, RouteError> {
        Self::new(prefix, RouteTarget::Service(service.to_string()))
    }

    /// Authenticated route served by the aggregator
    pub fn aggregator(prefix: &str) -> Result<Self, RouteError> {
        Self::new(prefix, RouteTarget::Aggregator)
    }

    pub fn stripped(mut self) -> Self {
        self.strip_prefix = true;
        self
    }

    pub fn public(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    pub fn internal_only(mut self) -> Self {
        self.internal = true;
        self
    }

    /// The part of `path` after the prefix, if this rule matches it.
    /// Empty when the path is exactly the prefix.
    pub fn remainder<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.path_prefix == "/" {
            return path.starts_with('/').then_some(path);
        }
        path.strip_prefix(self.path_prefix.as_str())
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    pub fn matches(&self, path: &str) -> bool {
        self.remainder(path).is_some()
    }

    /// Path sent upstream
    pub fn upstream_path(&self, path: &str) -> String {
        if !self.strip_prefix {
            return path.to_string();
        }
        match self.remainder(path) {
            Some("") | None => "/".to_string(),
            Some(rest) => rest.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self { rules }
    }

    pub fn from_entries(entries: Vec<RouteEntry>) -> Result<Self, RouteError> {
        entries
            .into_iter()
            .map(RouteRule::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    /// Table used when no routes file is present
    pub fn default_table() -> Self {
        let rules = [
            RouteRule::service("/api/users", "users-service"),
            RouteRule::service("/usersservice", "users-service").map(RouteRule::stripped),
            RouteRule::aggregator("/feed"),
            RouteRule::service("/discussion", "content-service").map(RouteRule::stripped),
            RouteRule::service("/api/v1/auth", "users-service").map(RouteRule::public),
        ];
        // Prefixes above are literals starting with '/'
        Self::new(rules.into_iter().flatten().collect())
    }

    /// Longest matching prefix; first declared wins on ties
    pub fn find(&self, path: &str) -> Option<&RouteRule> {
        let mut best: Option<&RouteRule> = None;
        for rule in self.rules.iter().filter(|r| r.matches(path)) {
            if best.map_or(true, |b| rule.path_prefix.len() > b.path_prefix.len()) {
                best = Some(rule);
            }
        }
        best
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
