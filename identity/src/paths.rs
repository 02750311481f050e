//! Path classification and redirect-target sanitising.
//!
//! SYSTEM CONTEXT
//! ==============
//! The edge gatekeeper and the client route guard both gate on the same
//! [`RouteTable`], so a path never means "public" to one context and
//! "protected" to the other.
//!
//! MATCHING
//! ========
//! Entries are path prefixes matched on segment boundaries (`/feed` matches
//! `/feed` and `/feed/42`, not `/feedback`). The root entry `/` only matches
//! the root itself. When entries from several lists match, the longest one
//! wins, so `/api/admin` can be protected under a public `/api`.

use serde::{Deserialize, Serialize};

/// Access class of a navigation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathClass {
    /// Always visible.
    Public,
    /// Login/register/reset and the OAuth callback; visible regardless of session.
    AuthFlow,
    /// Requires a verified session.
    Protected,
}

/// How paths missing from every list are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlistedPolicy {
    /// Deny by default: unlisted paths require a session.
    #[default]
    Protect,
    /// Allow by default: unlisted paths pass through.
    Allow,
}

impl UnlistedPolicy {
    /// Parse `protect` / `allow` (case-insensitive).
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "protect" | "deny" => Some(Self::Protect),
            "allow" => Some(Self::Allow),
            _ => None,
        }
    }
}

/// Route configuration shared by the gatekeeper and the route guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    /// Public landing page; unauthenticated visitors are sent here.
    pub landing: String,
    /// Sign-in surface.
    pub login: String,
    /// Where a successful OAuth callback lands when `next` is absent or unsafe.
    pub default_next: String,
    pub public: Vec<String>,
    pub auth_flow: Vec<String>,
    pub protected: Vec<String>,
    pub unlisted: UnlistedPolicy,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            landing: "/".to_owned(),
            login: "/login".to_owned(),
            default_next: "/feed".to_owned(),
            public: to_owned(&["/", "/healthz", "/api", "/pkg", "/assets", "/favicon.ico", "/robots.txt"]),
            auth_flow: to_owned(&["/login", "/register", "/reset-password", "/auth"]),
            protected: to_owned(&["/feed", "/profile", "/settings", "/bookmarks", "/post", "/nasa"]),
            unlisted: UnlistedPolicy::Protect,
        }
    }
}

fn to_owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

impl RouteTable {
    /// Classify `path`. Query strings and fragments are ignored.
    #[must_use]
    pub fn classify(&self, path: &str) -> PathClass {
        let path = normalize(path);
        if path == normalize(&self.landing) {
            return PathClass::Public;
        }

        let lists = [
            (&self.public, PathClass::Public),
            (&self.auth_flow, PathClass::AuthFlow),
            (&self.protected, PathClass::Protected),
        ];
        let best = lists
            .iter()
            .flat_map(|(entries, class)| entries.iter().map(move |e| (normalize(e), *class)))
            .filter(|(entry, _)| prefix_matches(entry, path))
            .max_by_key(|(entry, _)| entry.len());

        match best {
            Some((_, class)) => class,
            None => match self.unlisted {
                UnlistedPolicy::Protect => PathClass::Protected,
                UnlistedPolicy::Allow => PathClass::Public,
            },
        }
    }

    /// Whether `path` is the landing page.
    #[must_use]
    pub fn is_landing(&self, path: &str) -> bool {
        normalize(path) == normalize(&self.landing)
    }
}

fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

fn prefix_matches(entry: &str, path: &str) -> bool {
    if entry == "/" {
        return path == "/";
    }
    path == entry || path.strip_prefix(entry).is_some_and(|rest| rest.starts_with('/'))
}

/// Return `next` when it is a same-origin relative path, else `default`.
///
/// Rejects absolute URLs, scheme-relative `//host` targets, backslashes (which
/// some browsers treat as `/`) and control characters.
#[must_use]
pub fn safe_next_path(next: Option<&str>, default: &str) -> String {
    match next {
        Some(candidate) if is_relative_path(candidate) => candidate.to_owned(),
        _ => default.to_owned(),
    }
}

fn is_relative_path(candidate: &str) -> bool {
    candidate.starts_with('/')
        && !candidate.starts_with("//")
        && !candidate.contains('\\')
        && !candidate.chars().any(char::is_control)
}

#[cfg(test)]
#[path = "paths_test.rs"]
mod tests;
