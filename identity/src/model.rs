//! Identity data model shared by every execution context.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// PROVIDER TYPES
// =============================================================================

/// Social-login and sign-up claims attached to a provider user.
///
/// Providers disagree on claim names, so every known alias is kept and the
/// derivation helpers pick the first populated one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserMetadata {
    pub full_name: Option<String>,
    pub name: Option<String>,
    pub user_name: Option<String>,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub picture: Option<String>,
}

impl UserMetadata {
    /// Display name from a social login, if any.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        [&self.full_name, &self.name, &self.user_name]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .find(|v| !v.trim().is_empty())
    }

    /// Avatar URL from a social login, if any.
    #[must_use]
    pub fn avatar(&self) -> Option<&str> {
        [&self.avatar_url, &self.picture]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .find(|v| !v.trim().is_empty())
    }
}

/// User record as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

/// Provider-issued session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of the access token in seconds, as hinted by the provider.
    pub expires_in: i64,
    /// Absolute expiry (Unix seconds). Filled from `expires_in` when absent.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: ProviderUser,
}

impl Session {
    /// Absolute expiry in Unix seconds, relative to `issued_at` when the
    /// provider omitted `expires_at`.
    #[must_use]
    pub fn expiry(&self, issued_at: i64) -> i64 {
        self.expires_at.unwrap_or(issued_at + self.expires_in)
    }

    /// Whether the access token is expired at `now` (Unix seconds).
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Token pair as persisted by a [`crate::client::TokenStore`].
///
/// Narrower than [`Session`]: cookie-backed stores cannot recover the user
/// or the expiry, and neither is needed to re-verify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl From<&Session> for SessionTokens {
    fn from(session: &Session) -> Self {
        Self {
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
            expires_at: session.expires_at,
        }
    }
}

impl SessionTokens {
    /// Whether the access token is known to be expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Auth state-change events emitted by [`crate::AuthClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Session),
    TokenRefreshed(Session),
    UserUpdated(Session),
    SignedOut,
}

impl AuthEvent {
    /// Session carried by the event, `None` for sign-out.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::SignedIn(s) | Self::TokenRefreshed(s) | Self::UserUpdated(s) => Some(s),
            Self::SignedOut => None,
        }
    }

    /// Stable event name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SignedIn(_) => "signed_in",
            Self::TokenRefreshed(_) => "token_refreshed",
            Self::UserUpdated(_) => "user_updated",
            Self::SignedOut => "signed_out",
        }
    }
}

// =============================================================================
// PROFILE TYPES
// =============================================================================

/// Durable per-user display record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    #[serde(default)]
    pub verified: bool,
}

/// Row to insert when a user is first observed without a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProfile {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: String,
    pub bio: String,
    pub verified: bool,
}

// =============================================================================
// VIEW MODEL
// =============================================================================

/// Current identity as consumed by the UI, rebuilt from session + profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub username: String,
    pub avatar_url: String,
}

#[cfg(test)]
#[path = "model_test.rs"]
mod tests;
