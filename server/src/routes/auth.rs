//! OAuth / magic-link code exchange.
//!
//! `GET /auth/callback?code=&next=` is where the identity provider sends the
//! browser back. Every outcome is a redirect marked `no-store`, so a cached
//! callback response can never replay a session cookie.

use axum::extract::{Query, State};
use axum::http::header::CACHE_CONTROL;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use identity::{ProfileSeed, ProviderUser, provision_profile, safe_next_path};
use serde::Deserialize;
use time::OffsetDateTime;

use super::cookies;
use crate::state::AppState;

/// Error flag appended to the login path when the exchange fails.
pub const CALLBACK_FAILED: &str = "auth_callback_failed";

const NO_STORE: &str = "no-store, must-revalidate";

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    next: Option<String>,
}

fn no_store(resp: impl IntoResponse) -> Response {
    ([(CACHE_CONTROL, NO_STORE)], resp).into_response()
}

async fn provision(state: &AppState, user: &ProviderUser) {
    if let Err(e) = provision_profile(state.profiles.as_ref(), ProfileSeed::from_user(user)).await {
        tracing::warn!(user_id = %user.id, error = %e, "profile provisioning failed; continuing");
    }
}

/// `GET /auth/callback`: exchange the code, provision the profile, set the
/// session cookies and send the browser to `next`.
pub async fn callback(State(state): State<AppState>, jar: CookieJar, Query(params): Query<CallbackQuery>) -> Response {
    let routes = &state.config.routes;
    let cookie_config = &state.config.cookies;

    let Some(code) = params.code.as_deref().map(str::trim).filter(|c| !c.is_empty()) else {
        tracing::debug!("auth callback without code");
        return no_store(Redirect::temporary(&routes.login));
    };

    let verifier = cookies::code_verifier(&jar, cookie_config);
    let session = match state
        .provider
        .exchange_code_for_session(code, verifier.as_deref())
        .await
    {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(error = %e, "auth code exchange failed");
            let jar = cookies::clear_code_verifier(jar, cookie_config);
            let target = format!("{}?error={CALLBACK_FAILED}", routes.login);
            return no_store((jar, Redirect::temporary(&target)));
        }
    };

    match state.provider.get_user(&session.access_token).await {
        Ok(user) => provision(&state, &user).await,
        Err(e) => tracing::warn!(error = %e, "user lookup after code exchange failed; skipping profile"),
    }

    let jar = cookies::set_session(jar, cookie_config, &session, OffsetDateTime::now_utc());
    let jar = cookies::clear_code_verifier(jar, cookie_config);
    let target = safe_next_path(params.next.as_deref(), &routes.default_next);
    tracing::info!(user_id = %session.user.id, %target, "auth callback complete");
    no_store((jar, Redirect::temporary(&target)))
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
