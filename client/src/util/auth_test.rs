use identity::{AuthenticatedUser, UnlistedPolicy};
use uuid::Uuid;

use super::*;

fn someone() -> AuthenticatedUser {
    AuthenticatedUser {
        id: Uuid::new_v4(),
        email: None,
        username: "ada".to_owned(),
        avatar_url: "https://img.example/ada.png".to_owned(),
    }
}

fn anonymous() -> AuthState {
    AuthState::settled(None)
}

#[test]
fn should_redirect_unauth_from_protected_path() {
    let routes = RouteTable::default();
    assert!(should_redirect_unauth(&anonymous(), "/feed", &routes));
    assert_eq!(route_guard_target(&anonymous(), "/settings/profile", &routes).as_deref(), Some("/"));
}

#[test]
fn should_not_redirect_while_loading() {
    let routes = RouteTable::default();
    let state = AuthState::default();
    assert!(state.loading);
    assert!(!should_redirect_unauth(&state, "/feed", &routes));
}

#[test]
fn should_not_redirect_when_user_exists() {
    let routes = RouteTable::default();
    let state = AuthState::settled(Some(someone()));
    assert!(!should_redirect_unauth(&state, "/feed", &routes));
}

#[test]
fn landing_is_never_redirected() {
    let routes = RouteTable { landing: "/welcome".to_owned(), ..RouteTable::default() };
    assert!(!should_redirect_unauth(&anonymous(), "/welcome", &routes));
    assert!(!should_redirect_unauth(&anonymous(), "/welcome/", &routes));
}

#[test]
fn public_and_auth_flow_paths_pass() {
    let routes = RouteTable::default();
    for path in ["/", "/login", "/register", "/reset-password", "/auth/callback", "/healthz"] {
        assert!(!should_redirect_unauth(&anonymous(), path, &routes), "{path}");
    }
}

#[test]
fn signed_in_users_may_stay_on_auth_flow_pages() {
    let routes = RouteTable::default();
    let state = AuthState::settled(Some(someone()));
    assert_eq!(route_guard_target(&state, "/login", &routes), None);
}

#[test]
fn unlisted_paths_follow_policy() {
    let protect = RouteTable::default();
    assert!(should_redirect_unauth(&anonymous(), "/somewhere", &protect));

    let allow = RouteTable { unlisted: UnlistedPolicy::Allow, ..RouteTable::default() };
    assert!(!should_redirect_unauth(&anonymous(), "/somewhere", &allow));
}
