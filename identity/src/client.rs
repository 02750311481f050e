//! Stateful provider client for long-lived (browser) contexts.
//!
//! ARCHITECTURE
//! ============
//! Wraps a stateless [`IdentityProvider`] with the two things a page needs:
//! one current session slot (mirrored into a [`TokenStore`]) and an
//! auth state-change stream. Every session mutation publishes an
//! [`AuthEvent`] so stores subscribed through
//! [`AuthClient::on_auth_state_change`] converge without polling.
//!
//! TRADE-OFFS
//! ==========
//! The stream is a bounded broadcast. A subscriber that falls behind skips
//! to the newest events; each event carries a full session snapshot, so
//! intermediate ones are not needed to converge.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;

use crate::clock;
use crate::model::{AuthEvent, ProviderUser, Session, SessionTokens, UserMetadata};
use crate::provider::{IdentityProvider, ProviderError, SignOutScope, SignUpOutcome};

const EVENT_CAPACITY: usize = 16;

/// Durable home of the token pair (cookies, local storage).
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<SessionTokens>;
    fn save(&self, tokens: &SessionTokens);
    fn clear(&self);
}

/// Handle to the auth event stream. Dropping it unsubscribes.
pub struct AuthSubscription {
    rx: broadcast::Receiver<AuthEvent>,
}

impl AuthSubscription {
    /// Next event, or `None` once the client is gone.
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "auth subscriber lagged; skipping to newest events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Stop receiving events.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

/// Provider client holding the current session of one browser context.
pub struct AuthClient {
    provider: Arc<dyn IdentityProvider>,
    tokens: RwLock<Option<SessionTokens>>,
    persist: Option<Arc<dyn TokenStore>>,
    events: broadcast::Sender<AuthEvent>,
}

impl AuthClient {
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { provider, tokens: RwLock::new(None), persist: None, events }
    }

    /// Restore tokens from `store` and mirror every future change into it.
    #[must_use]
    pub fn with_token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        let restored = store.load();
        *self.tokens.get_mut().unwrap_or_else(PoisonError::into_inner) = restored;
        self.persist = Some(store);
        self
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    /// Subscribe to auth state changes.
    #[must_use]
    pub fn on_auth_state_change(&self) -> AuthSubscription {
        AuthSubscription { rx: self.events.subscribe() }
    }

    /// Locally held tokens. Not verified; may be stale or revoked.
    #[must_use]
    pub fn get_session(&self) -> Option<SessionTokens> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current access token, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.get_session().map(|t| t.access_token)
    }

    fn store(&self, session: &Session) {
        let tokens = SessionTokens::from(session);
        if let Some(persist) = &self.persist {
            persist.save(&tokens);
        }
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = Some(tokens);
    }

    fn forget(&self) {
        if let Some(persist) = &self.persist {
            persist.clear();
        }
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn emit(&self, event: AuthEvent) {
        tracing::debug!(event = event.name(), "auth state change");
        // No receivers is fine: nobody is mounted yet.
        let _ = self.events.send(event);
    }

    /// Adopt an externally obtained session (e.g. after an OAuth redirect).
    pub fn set_session(&self, session: Session) {
        self.store(&session);
        self.emit(AuthEvent::SignedIn(session));
    }

    /// Verify the held session live against the provider.
    ///
    /// Returns `Ok(None)` when there is no session or the provider rejected
    /// both the access and the refresh token (the session is then dropped and
    /// `SignedOut` emitted). A rejected access token with a valid refresh
    /// token rotates the session and emits `TokenRefreshed`.
    ///
    /// # Errors
    ///
    /// Returns a transport/api [`ProviderError`] when the provider could not
    /// give an answer; the held session is kept in that case.
    pub async fn get_user(&self) -> Result<Option<ProviderUser>, ProviderError> {
        let Some(tokens) = self.get_session() else {
            return Ok(None);
        };

        if !tokens.is_expired(clock::now_unix()) {
            match self.provider.get_user(&tokens.access_token).await {
                Ok(user) => return Ok(Some(user)),
                Err(e) if e.is_rejection() => {
                    tracing::debug!(error = %e, "access token rejected; trying refresh");
                }
                Err(e) => return Err(e),
            }
        }

        match self.refresh_with(&tokens.refresh_token).await {
            Ok(session) => Ok(Some(session.user)),
            Err(e) if e.is_rejection() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Rotate the held session using its refresh token.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Unauthorized`] when no session is held, or the
    /// provider error from the refresh call.
    pub async fn refresh_session(&self) -> Result<Session, ProviderError> {
        let tokens = self.get_session().ok_or(ProviderError::Unauthorized)?;
        self.refresh_with(&tokens.refresh_token).await
    }

    async fn refresh_with(&self, refresh_token: &str) -> Result<Session, ProviderError> {
        match self.provider.refresh_session(refresh_token).await {
            Ok(session) => {
                self.store(&session);
                self.emit(AuthEvent::TokenRefreshed(session.clone()));
                Ok(session)
            }
            Err(e) => {
                if e.is_rejection() {
                    tracing::info!(error = %e, "refresh token rejected; dropping session");
                    self.forget();
                    self.emit(AuthEvent::SignedOut);
                }
                Err(e)
            }
        }
    }

    /// Password sign-in. Replaces any held session.
    ///
    /// # Errors
    ///
    /// Returns the provider error unchanged; the held session is untouched on failure.
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, ProviderError> {
        let session = self.provider.sign_in_with_password(email, password).await?;
        self.store(&session);
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    /// Create an account. Never adopts the returned session; signing in
    /// afterwards is the caller's decision.
    ///
    /// # Errors
    ///
    /// Returns the provider error unchanged.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> Result<SignUpOutcome, ProviderError> {
        self.provider.sign_up(email, password, metadata).await
    }

    /// Revoke the session with the provider, then drop it locally.
    ///
    /// The local drop and the `SignedOut` event happen even when the
    /// provider call fails.
    ///
    /// # Errors
    ///
    /// Returns the provider error from the revocation call.
    pub async fn sign_out(&self, scope: SignOutScope) -> Result<(), ProviderError> {
        let result = match self.get_session() {
            Some(tokens) => self.provider.sign_out(&tokens.access_token, scope).await,
            None => Ok(()),
        };
        self.forget();
        self.emit(AuthEvent::SignedOut);
        result
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
