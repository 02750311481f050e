//! Auth-session state for the current browser user.
//!
//! SYSTEM CONTEXT
//! ==============
//! Published by [`crate::state::session::SessionStore`] and mirrored into an
//! `RwSignal<AuthState>` in context. Read by the route guard and by
//! identity-dependent components.

use identity::AuthenticatedUser;

/// Authentication state tracking the current user and loading status.
///
/// Starts in `loading` so nothing acts on "no user" before the boot-time
/// verification has answered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthState {
    pub user: Option<AuthenticatedUser>,
    pub loading: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self { user: None, loading: true }
    }
}

impl AuthState {
    /// Settled state with a verified user, or without one.
    #[must_use]
    pub fn settled(user: Option<AuthenticatedUser>) -> Self {
        Self { user, loading: false }
    }

    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }
}
