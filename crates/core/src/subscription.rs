//! Subscription patterns.
//!
//! A pattern has the textual form `"<action>:<absolute-path-prefix>/*"`, for
//! example `"reply:/forum/topic/5/thread/42/*"`. The action is always stored
//! lower-cased. A pattern without the trailing wildcard matches exactly one
//! path. These strings are persisted and shown verbatim in the admin UI, so
//! the format here must not drift.
//!
//! All matching goes through [`matches`]; [`expand_patterns`] produces the
//! finite set of stored patterns that [`matches`] would accept for a given
//! event, which is what the store is queried with.

use std::fmt;

use crate::error::CoreError;

/// Suffix marking a prefix (wildcard) pattern.
const WILDCARD: &str = "/*";

/// A parsed subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionPattern {
    action: String,
    path: String,
    wildcard: bool,
}

impl SubscriptionPattern {
    /// Prefix pattern covering every path below `path`.
    pub fn prefix(action: &str, path: &str) -> Self {
        Self {
            action: action.to_lowercase(),
            path: normalize_path(path),
            wildcard: true,
        }
    }

    /// Parse the stored textual form.
    pub fn parse(pattern: &str) -> Result<Self, CoreError> {
        let (action, rest) = pattern
            .split_once(':')
            .ok_or_else(|| CoreError::InvalidPattern(pattern.to_string()))?;
        if action.is_empty() || !rest.starts_with('/') {
            return Err(CoreError::InvalidPattern(pattern.to_string()));
        }
        let (path, wildcard) = match rest.strip_suffix(WILDCARD) {
            Some(prefix) => (prefix, true),
            None if rest.ends_with('*') => {
                // The wildcard must follow a path separator.
                return Err(CoreError::InvalidPattern(pattern.to_string()));
            }
            None => (rest, false),
        };
        Ok(Self {
            action: action.to_lowercase(),
            path: normalize_path(path),
            wildcard,
        })
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Normalized absolute path (no trailing slash, `/` for the root).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Whether an event for `action` at `path` falls under this pattern.
    pub fn accepts(&self, action: &str, path: &str) -> bool {
        if !self.action.eq_ignore_ascii_case(action) {
            return false;
        }
        let path = normalize_path(path);
        if !self.wildcard {
            return self.path == path;
        }
        if self.path == "/" {
            return true;
        }
        path.len() > self.path.len()
            && path.starts_with(&self.path)
            && path.as_bytes()[self.path.len()] == b'/'
    }
}

impl fmt::Display for SubscriptionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.wildcard, self.path.as_str()) {
            (true, "/") => write!(f, "{}:/*", self.action),
            (true, path) => write!(f, "{}:{}/*", self.action, path),
            (false, path) => write!(f, "{}:{}", self.action, path),
        }
    }
}

/// The canonical stored pattern subscribing to everything below `path`.
pub fn pattern_for(action: &str, path: &str) -> String {
    SubscriptionPattern::prefix(action, path).to_string()
}

/// Check whether a stored pattern covers an event for `action` at `path`.
///
/// Unparseable patterns never match.
pub fn matches(pattern: &str, action: &str, path: &str) -> bool {
    SubscriptionPattern::parse(pattern).is_ok_and(|p| p.accepts(action, path))
}

/// Every stored pattern that [`matches`] an event for `action` at `path`.
///
/// The exact path comes first, followed by each ancestor wildcard from the
/// deepest up to the root wildcard `"<action>:/*"`.
pub fn expand_patterns(action: &str, path: &str) -> Vec<String> {
    let action = action.to_lowercase();
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return vec![format!("{action}:/*")];
    }

    let parts: Vec<&str> = trimmed.split('/').collect();
    let mut patterns = Vec::with_capacity(parts.len() + 1);
    patterns.push(format!("{action}:/{trimmed}"));
    for end in (1..parts.len()).rev() {
        patterns.push(format!("{action}:/{}/*", parts[..end].join("/")));
    }
    patterns.push(format!("{action}:/*"));
    patterns
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}
