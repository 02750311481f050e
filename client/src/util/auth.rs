//! Client route guard.
//!
//! SYSTEM CONTEXT
//! ==============
//! The edge gatekeeper already turns away unverified requests for protected
//! pages; this guard covers in-app navigation, which never reaches the
//! server. It classifies with the same [`RouteTable`] the gatekeeper uses.

use identity::{PathClass, RouteTable};
use leptos::prelude::*;
use leptos_router::NavigateOptions;

use crate::state::auth::AuthState;

/// Whether an unauthenticated visitor must leave `path`.
///
/// Never while loading, never from the landing page, never from public or
/// auth-flow paths.
pub fn should_redirect_unauth(state: &AuthState, path: &str, routes: &RouteTable) -> bool {
    if state.loading || state.user.is_some() || routes.is_landing(path) {
        return false;
    }
    routes.classify(path) == PathClass::Protected
}

/// Where to send the visitor, if anywhere.
pub fn route_guard_target(state: &AuthState, path: &str, routes: &RouteTable) -> Option<String> {
    should_redirect_unauth(state, path, routes).then(|| routes.landing.clone())
}

/// Re-evaluate the guard whenever auth state or the path changes.
pub fn install_route_guard<F>(auth: RwSignal<AuthState>, pathname: Memo<String>, routes: RouteTable, navigate: F)
where
    F: Fn(&str, NavigateOptions) + Clone + 'static,
{
    Effect::new(move || {
        let state = auth.get();
        let path = pathname.get();
        if let Some(target) = route_guard_target(&state, &path, &routes) {
            log::debug!("route guard: {path} -> {target}");
            navigate(&target, NavigateOptions { replace: true, ..NavigateOptions::default() });
        }
    });
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod auth_test;
