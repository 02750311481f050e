//! Identity provider seam.
//!
//! DESIGN
//! ======
//! The hosted provider is a black box reached over HTTP. This trait is the
//! stateless half of its API: every call takes the tokens it needs explicitly,
//! which is what the server-side gatekeeper wants. The stateful browser-side
//! surface (current session, event stream) is layered on top in
//! [`crate::AuthClient`].

use serde::{Deserialize, Serialize};

use crate::model::{ProviderUser, Session, UserMetadata};

/// Scope of a sign-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignOutScope {
    /// Revoke every session of the user, on every device.
    Global,
    /// Revoke only the presented session.
    Local,
}

impl SignOutScope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Local => "local",
        }
    }
}

/// Result of a sign-up call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpOutcome {
    pub user: ProviderUser,
    /// Present when the provider signs the user in immediately (no email
    /// confirmation required).
    pub session: Option<Session>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider unreachable: {0}")]
    Transport(String),
    #[error("invalid login credentials")]
    InvalidCredentials,
    #[error("email not confirmed")]
    EmailNotConfirmed,
    #[error("token rejected by provider")]
    Unauthorized,
    #[error("authorization grant rejected: {0}")]
    InvalidGrant(String),
    #[error("provider api error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("unexpected provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// True when the provider answered and said no, as opposed to the call
    /// failing in transit. Only rejections justify discarding stored tokens.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials | Self::EmailNotConfirmed | Self::Unauthorized | Self::InvalidGrant(_)
        )
    }
}

/// Provider-neutral async trait for the hosted identity service. Enables mocking in tests.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait IdentityProvider: Send + Sync {
    /// Password sign-in.
    ///
    /// # Errors
    ///
    /// [`ProviderError::InvalidCredentials`] or [`ProviderError::EmailNotConfirmed`]
    /// for credential problems; transport/api variants otherwise.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, ProviderError>;

    /// Create an account. `metadata` is stored as user claims.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the provider rejects the sign-up or is unreachable.
    async fn sign_up(&self, email: &str, password: &str, metadata: &UserMetadata)
    -> Result<SignUpOutcome, ProviderError>;

    /// Revoke the session owning `access_token`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the revocation call fails.
    async fn sign_out(&self, access_token: &str, scope: SignOutScope) -> Result<(), ProviderError>;

    /// Validate `access_token` live and return its user.
    ///
    /// # Errors
    ///
    /// [`ProviderError::Unauthorized`] when the token is expired, revoked or forged.
    async fn get_user(&self, access_token: &str) -> Result<ProviderUser, ProviderError>;

    /// Trade a refresh token for a new session.
    ///
    /// # Errors
    ///
    /// [`ProviderError::InvalidGrant`] or [`ProviderError::Unauthorized`] when the
    /// refresh token is no longer valid.
    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, ProviderError>;

    /// Trade a one-time authorization code for a session.
    ///
    /// # Errors
    ///
    /// [`ProviderError::InvalidGrant`] when the code is unknown, expired or already used.
    async fn exchange_code_for_session(&self, code: &str, code_verifier: Option<&str>)
    -> Result<Session, ProviderError>;
}
