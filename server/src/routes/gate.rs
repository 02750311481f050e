//! Edge session gatekeeper.
//!
//! ARCHITECTURE
//! ============
//! Installed with `middleware::from_fn_with_state` over the whole router, so
//! every request (pages, API, static assets) passes through it. When session
//! cookies are present they are verified live against the identity provider,
//! rotated through the refresh token when the access token is rejected, and
//! the resulting cookie changes ride on whatever response goes out.
//!
//! ERROR HANDLING
//! ==============
//! Verification fails closed. A provider rejection of the refresh token
//! clears the cookies; a transport failure keeps them so the next request
//! can try again. Either way the request proceeds without a user.

use std::convert::Infallible;

use axum::extract::{FromRequestParts, OptionalFromRequestParts, Request, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use identity::{IdentityProvider, PathClass, ProviderUser, Session};
use time::OffsetDateTime;

use super::cookies::{self, CookieTokens};
use crate::state::AppState;

/// Provider-verified user for the current request, set by [`session_gate`].
///
/// As an extractor it rejects with `401` when the gate found no user.
#[derive(Debug, Clone)]
pub struct VerifiedUser(pub ProviderUser);

impl<S> FromRequestParts<S> for VerifiedUser
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

impl<S> OptionalFromRequestParts<S> for VerifiedUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned())
    }
}

/// Result of checking presented cookies with the provider.
#[derive(Debug)]
pub enum Verification {
    /// Live user. `rotated` holds a fresh session when the refresh token was used.
    Verified { user: ProviderUser, rotated: Option<Session> },
    /// The provider refused both tokens; the cookies are dead.
    Rejected,
    /// The provider gave no answer.
    Unavailable,
}

/// Verify `tokens`: access token first, then one refresh attempt.
pub async fn verify_tokens(provider: &dyn IdentityProvider, tokens: &CookieTokens) -> Verification {
    if let Some(access) = tokens.access.as_deref() {
        match provider.get_user(access).await {
            Ok(user) => return Verification::Verified { user, rotated: None },
            Err(e) if e.is_rejection() => {
                tracing::debug!(error = %e, "access token rejected");
            }
            Err(e) => {
                tracing::warn!(error = %e, "session verification unavailable");
                return Verification::Unavailable;
            }
        }
    }

    let Some(refresh) = tokens.refresh.as_deref() else {
        return Verification::Rejected;
    };
    match provider.refresh_session(refresh).await {
        Ok(session) => Verification::Verified { user: session.user.clone(), rotated: Some(session) },
        Err(e) if e.is_rejection() => {
            tracing::info!(error = %e, "refresh token rejected; clearing session cookies");
            Verification::Rejected
        }
        Err(e) => {
            tracing::warn!(error = %e, "session refresh unavailable");
            Verification::Unavailable
        }
    }
}

/// Gatekeeper middleware.
pub async fn session_gate(State(state): State<AppState>, jar: CookieJar, mut req: Request, next: Next) -> Response {
    let cookie_config = &state.config.cookies;
    let routes = &state.config.routes;
    let path = req.uri().path().to_owned();
    let class = routes.classify(&path);

    let tokens = cookies::read_tokens(&jar, cookie_config);
    let (user, jar) = if tokens.is_empty() {
        (None, jar)
    } else {
        match verify_tokens(state.provider.as_ref(), &tokens).await {
            Verification::Verified { user, rotated: Some(session) } => {
                let jar = cookies::set_session(jar, cookie_config, &session, OffsetDateTime::now_utc());
                (Some(user), jar)
            }
            Verification::Verified { user, rotated: None } => (Some(user), jar),
            Verification::Rejected => (None, cookies::clear_session(jar, cookie_config)),
            Verification::Unavailable => (None, jar),
        }
    };

    if class == PathClass::Protected && user.is_none() {
        tracing::debug!(%path, "no verified session; redirecting to landing");
        return (jar, Redirect::temporary(&routes.landing)).into_response();
    }

    if let Some(user) = user {
        req.extensions_mut().insert(VerifiedUser(user));
    }

    let response = next.run(req).await;
    if cookies::sets_session_cookie(response.headers(), cookie_config) {
        return response;
    }
    (jar, response).into_response()
}

#[cfg(test)]
#[path = "gate_test.rs"]
mod tests;
