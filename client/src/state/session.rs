//! Client session store.
//!
//! ARCHITECTURE
//! ============
//! One `SessionStore` per page, constructed at the root and shared through
//! context. It owns the published [`AuthState`] (a `watch` channel the root
//! mirrors into an `RwSignal`) and keeps it in step with the identity
//! provider: a verified check at boot, then every auth event until teardown.
//!
//! CONCURRENCY
//! ===========
//! Every state write goes through [`SessionStore::commit`], which holds
//! `commit_lock` across the liveness check, the advisory cache write and the
//! state publish. Cache and state therefore never disagree, and nothing is
//! written once [`SessionStore::teardown`] has returned.
//!
//! The lock also guards a sign-out epoch, bumped by every signed-out commit.
//! A user view built across an await (boot check, auth event) is committed
//! only if no sign-out landed meanwhile, so a slow profile fetch cannot put
//! a signed-out user back into state or the cache.
//!
//! ERROR HANDLING
//! ==============
//! Provider failures are logged with their detail and surfaced to the UI as
//! [`SessionError`], whose messages carry no provider text.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use identity::{
    AuthClient, AuthEvent, AuthSubscription, AuthenticatedUser, ProfileSeed, ProfileStore, ProviderError, ProviderUser,
    RouteTable, SignOutScope, UserMetadata, build_authenticated_user, clock, provision_profile,
};
use tokio::sync::watch;
use uuid::Uuid;

use crate::state::auth::AuthState;
use crate::util::cache::AdvisoryCache;
use crate::util::navigate::Navigator;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Please confirm your email address before signing in.")]
    EmailNotConfirmed,
    #[error("Invalid email or password.")]
    InvalidCredentials,
    #[error("Sign-in is unavailable right now. Please try again.")]
    Unavailable,
    #[error("Registration failed. Please try again.")]
    Registration,
}

impl SessionError {
    fn from_sign_in(err: &ProviderError) -> Self {
        match err {
            ProviderError::EmailNotConfirmed => Self::EmailNotConfirmed,
            ProviderError::InvalidCredentials => Self::InvalidCredentials,
            _ => Self::Unavailable,
        }
    }
}

/// Result of a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub user_id: Uuid,
    /// The provider wants the address confirmed before the first sign-in.
    pub needs_confirmation: bool,
}

fn lock(m: &Mutex<u64>) -> MutexGuard<'_, u64> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SessionStore {
    auth: Arc<AuthClient>,
    profiles: Arc<dyn ProfileStore>,
    cache: AdvisoryCache,
    navigator: Arc<dyn Navigator>,
    routes: RouteTable,
    state: watch::Sender<AuthState>,
    alive: watch::Sender<bool>,
    /// Sign-out epoch.
    commit_lock: Mutex<u64>,
}

impl SessionStore {
    #[must_use]
    pub fn new(
        auth: Arc<AuthClient>,
        profiles: Arc<dyn ProfileStore>,
        cache: AdvisoryCache,
        navigator: Arc<dyn Navigator>,
        routes: RouteTable,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        let (alive, _) = watch::channel(true);
        Self { auth, profiles, cache, navigator, routes, state, alive, commit_lock: Mutex::new(0) }
    }

    #[must_use]
    pub fn auth_client(&self) -> &Arc<AuthClient> {
        &self.auth
    }

    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Receiver of every published [`AuthState`].
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> AuthState {
        let _guard = lock(&self.commit_lock);
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        *self.alive.borrow()
    }

    /// Resolves once [`Self::teardown`] has run.
    pub async fn torn_down(&self) {
        let mut rx = self.alive.subscribe();
        // Only errs when the sender is dropped, which means `self` is gone too.
        let _ = rx.wait_for(|alive| !alive).await;
    }

    // =========================================================================
    // COMMIT
    // =========================================================================

    /// Publish a settled state and mirror it into the cache.
    fn commit(&self, user: Option<AuthenticatedUser>) -> bool {
        self.commit_since(user, None)
    }

    fn epoch(&self) -> u64 {
        *lock(&self.commit_lock)
    }

    /// [`Self::commit`], refusing a user view if a sign-out was committed
    /// after `seen` was read.
    fn commit_since(&self, user: Option<AuthenticatedUser>, seen: Option<u64>) -> bool {
        let mut epoch = lock(&self.commit_lock);
        if !self.is_alive() {
            return false;
        }
        if user.is_some() && seen.is_some_and(|seen| seen != *epoch) {
            return false;
        }
        match &user {
            Some(u) => self.cache.save(u, clock::now_millis()),
            None => {
                self.cache.clear();
                *epoch += 1;
            }
        }
        self.state.send_replace(AuthState::settled(user));
        true
    }

    fn set_loading(&self, loading: bool) {
        let _guard = lock(&self.commit_lock);
        if self.is_alive() {
            self.state.send_modify(|s| s.loading = loading);
        }
    }

    /// Show a cached user without settling `loading`.
    fn seed(&self, user: AuthenticatedUser) {
        let _guard = lock(&self.commit_lock);
        if self.is_alive() {
            self.state.send_modify(|s| s.user = Some(user));
        }
    }

    async fn view_for(&self, user: &ProviderUser) -> AuthenticatedUser {
        let profile = match self.profiles.find(user.id).await {
            Ok(profile) => profile,
            Err(e) => {
                log::warn!("profile lookup for {} failed: {e}", user.id);
                None
            }
        };
        build_authenticated_user(user, profile.as_ref())
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Boot-time check. `loading` turns false only once the provider has answered.
    pub async fn initialize(&self) {
        if let Some(cached) = self.cache.load(clock::now_millis()) {
            self.seed(cached);
        }
        let seen = self.epoch();

        let verified = match self.auth.get_user().await {
            Ok(user) => user,
            Err(e) => {
                log::warn!("session verification failed: {e}");
                None
            }
        };
        let view = match verified {
            Some(user) => Some(self.view_for(&user).await),
            None => None,
        };
        if !self.commit_since(view, Some(seen)) {
            log::debug!("boot check dropped: torn down or signed out meanwhile");
        }
    }

    /// Apply auth events until teardown, then drop the subscription.
    pub async fn listen(&self, mut subscription: AuthSubscription) {
        while self.is_alive() {
            let event = tokio::select! {
                () = self.torn_down() => break,
                event = subscription.recv() => event,
            };
            let Some(event) = event else {
                break;
            };
            self.handle_event(event).await;
        }
        subscription.unsubscribe();
    }

    pub async fn handle_event(&self, event: AuthEvent) {
        log::debug!("auth event: {}", event.name());
        let seen = self.epoch();
        let view = match event.session() {
            Some(session) => Some(self.view_for(&session.user).await),
            None => None,
        };
        if !self.commit_since(view, Some(seen)) {
            log::debug!("dropped {}: torn down or signed out meanwhile", event.name());
        }
    }

    /// Stop publishing. Idempotent.
    pub fn teardown(&self) {
        let _guard = lock(&self.commit_lock);
        self.alive.send_replace(false);
    }

    /// Guard that tears the store down when dropped.
    #[must_use]
    pub fn teardown_guard(self: &Arc<Self>) -> TeardownGuard {
        TeardownGuard(Arc::clone(self))
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    /// Password sign-in.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] describing the failure in user-facing terms.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthenticatedUser, SessionError> {
        self.set_loading(true);
        match self.auth.sign_in_with_password(email, password).await {
            Ok(session) => {
                // First sign-in after a confirmation-pending sign-up creates the profile.
                let seed = ProfileSeed { access_token: Some(&session.access_token), ..ProfileSeed::from_user(&session.user) };
                if let Err(e) = provision_profile(self.profiles.as_ref(), seed).await {
                    log::warn!("profile provisioning at sign-in failed: {e}");
                }
                let view = self.view_for(&session.user).await;
                self.commit(Some(view.clone()));
                Ok(view)
            }
            Err(e) => {
                log::info!("sign-in failed: {e}");
                self.set_loading(false);
                Err(SessionError::from_sign_in(&e))
            }
        }
    }

    /// Create an account and its profile. Does not sign in.
    ///
    /// The profile is written with the new account's own session, never the
    /// one this store holds. Without a session (confirmation pending) there is
    /// nothing to write as, so the row is created at the first sign-in or
    /// callback; the requested username travels in the sign-up metadata.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Registration`] when the provider refuses the
    /// sign-up. Profile provisioning failures are logged only.
    pub async fn register(&self, email: &str, password: &str, username: &str) -> Result<Registration, SessionError> {
        let requested = username.trim();
        let metadata = UserMetadata {
            username: (!requested.is_empty()).then(|| requested.to_owned()),
            ..UserMetadata::default()
        };

        let outcome = self
            .auth
            .sign_up(email, password, &metadata)
            .await
            .map_err(|e| {
                log::info!("sign-up failed: {e}");
                SessionError::Registration
            })?;

        match &outcome.session {
            Some(session) => {
                let seed = ProfileSeed {
                    user: &outcome.user,
                    requested_username: Some(requested),
                    access_token: Some(&session.access_token),
                };
                if let Err(e) = provision_profile(self.profiles.as_ref(), seed).await {
                    log::warn!("profile provisioning after sign-up failed: {e}");
                }
            }
            None => log::info!("profile for {} waits for the first sign-in", outcome.user.id),
        }

        Ok(Registration { user_id: outcome.user.id, needs_confirmation: outcome.session.is_none() })
    }

    /// Revoke every session of the user, clear local state and reload at the
    /// login page, whatever the provider answered.
    pub async fn logout(&self) {
        if let Err(e) = self.auth.sign_out(SignOutScope::Global).await {
            log::warn!("provider sign-out failed; clearing local session anyway: {e}");
        }
        self.commit(None);
        self.navigator.hard_navigate(&self.routes.login);
    }
}

/// Tears its [`SessionStore`] down on drop.
pub struct TeardownGuard(Arc<SessionStore>);

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        self.0.teardown();
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;
