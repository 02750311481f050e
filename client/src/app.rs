//! Session wiring for the Leptos root.
//!
//! SYSTEM CONTEXT
//! ==============
//! [`SessionRoot`] is mounted once, inside the router. It builds nothing
//! itself: the caller hands it a [`SessionStore`] (usually from
//! [`browser_session_store`]), and it provides that store plus an
//! `RwSignal<AuthState>` mirror through context, starts boot verification and
//! the event listener, and tears everything down with the root owner.

use std::sync::Arc;

use identity::{
    AuthClient, HttpIdentityProvider, ProviderConfig, ProviderConfigError, ProviderError, RestProfileStore, RouteTable,
};
use leptos::prelude::*;
use leptos::task::spawn_local;
use leptos_router::hooks::{use_location, use_navigate};

use crate::state::auth::AuthState;
use crate::state::session::SessionStore;
use crate::util::auth::install_route_guard;
use crate::util::cache::{AdvisoryCache, DEFAULT_CACHE_TTL_MS, LocalStorage};
use crate::util::cookies::CookieTokenStore;
use crate::util::navigate::BrowserNavigator;

pub const DEFAULT_COOKIE_PREFIX: &str = "orbit";
/// Matches the server's refresh-cookie lifetime.
pub const DEFAULT_REFRESH_MAX_AGE_SECS: i64 = 400 * 24 * 60 * 60;

/// Browser-side session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub provider: ProviderConfig,
    pub routes: RouteTable,
    pub cookie_prefix: String,
    pub cookie_secure: bool,
    pub refresh_max_age_secs: i64,
    pub cache_ttl_ms: i64,
}

impl ClientConfig {
    #[must_use]
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            provider,
            routes: RouteTable::default(),
            cookie_prefix: DEFAULT_COOKIE_PREFIX.to_owned(),
            cookie_secure: false,
            refresh_max_age_secs: DEFAULT_REFRESH_MAX_AGE_SECS,
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
        }
    }

    /// Settings baked in at build time (`IDENTITY_URL`, `IDENTITY_ANON_KEY`,
    /// optional `IDENTITY_TIMEOUT_SECS`, `SESSION_COOKIE_PREFIX`, `COOKIE_SECURE`).
    ///
    /// # Errors
    ///
    /// Returns an error if the provider settings were not set at build time.
    pub fn from_build_env() -> Result<Self, ProviderConfigError> {
        let provider = ProviderConfig::from_lookup(|key| {
            match key {
                "IDENTITY_URL" => option_env!("IDENTITY_URL"),
                "IDENTITY_ANON_KEY" => option_env!("IDENTITY_ANON_KEY"),
                "IDENTITY_TIMEOUT_SECS" => option_env!("IDENTITY_TIMEOUT_SECS"),
                _ => None,
            }
            .map(str::to_owned)
        })?;

        let mut config = Self::new(provider);
        if let Some(prefix) = option_env!("SESSION_COOKIE_PREFIX") {
            config.cookie_prefix = prefix.to_owned();
        }
        config.cookie_secure = option_env!("COOKIE_SECURE").is_some_and(|v| matches!(v, "1" | "true" | "yes" | "on"));
        Ok(config)
    }
}

/// Session store over the real provider, cookies, `localStorage` and
/// `window.location`.
///
/// # Errors
///
/// Returns an error if an HTTP client cannot be built.
pub fn browser_session_store(config: &ClientConfig) -> Result<Arc<SessionStore>, ProviderError> {
    let provider = Arc::new(HttpIdentityProvider::new(config.provider.clone())?);
    let tokens = Arc::new(CookieTokenStore::new(
        config.cookie_prefix.clone(),
        config.cookie_secure,
        config.refresh_max_age_secs,
    ));
    let auth = Arc::new(AuthClient::new(provider).with_token_store(tokens));
    let profiles = Arc::new(RestProfileStore::new(config.provider.clone())?.with_auth(auth.clone()));
    let cache = AdvisoryCache::new(Arc::new(LocalStorage), config.cache_ttl_ms);

    Ok(Arc::new(SessionStore::new(
        auth,
        profiles,
        cache,
        Arc::new(BrowserNavigator),
        config.routes.clone(),
    )))
}

/// Provide `store` and its state mirror through context, start boot
/// verification and event handling, and tear down with the current owner.
pub fn provide_session(store: Arc<SessionStore>) -> RwSignal<AuthState> {
    let auth = RwSignal::new(store.snapshot());
    provide_context(auth);
    provide_context(store.clone());

    // Subscribe before anything runs so no event or state change is missed.
    let subscription = store.auth_client().on_auth_state_change();
    let mut rx = store.subscribe();

    spawn_local({
        let store = store.clone();
        async move { store.listen(subscription).await }
    });
    spawn_local({
        let store = store.clone();
        async move { store.initialize().await }
    });
    spawn_local({
        let store = store.clone();
        async move {
            loop {
                tokio::select! {
                    () = store.torn_down() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let next = rx.borrow_and_update().clone();
                        auth.set(next);
                    }
                }
            }
        }
    });

    let guard = store.teardown_guard();
    on_cleanup(move || drop(guard));
    auth
}

pub fn use_auth() -> RwSignal<AuthState> {
    expect_context::<RwSignal<AuthState>>()
}

pub fn use_session_store() -> Arc<SessionStore> {
    expect_context::<Arc<SessionStore>>()
}

/// Session provider plus route guard. Must be rendered inside the router.
#[component]
pub fn SessionRoot(store: Arc<SessionStore>, children: Children) -> impl IntoView {
    let routes = store.routes().clone();
    let auth = provide_session(store);
    install_route_guard(auth, use_location().pathname, routes, use_navigate());
    children()
}

#[cfg(test)]
#[path = "app_test.rs"]
mod app_test;
