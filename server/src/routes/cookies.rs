//! Session cookie jar helpers shared by the gatekeeper and the callback.
//!
//! The browser `AuthClient` reads the same pair back through `document.cookie`,
//! so these cookies are not `HttpOnly`. Every write sets both an absolute
//! `Expires` and `Max-Age`; clears are zero-max-age tombstones on `path=/`.

use axum::http::HeaderMap;
use axum::http::header::SET_COOKIE;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use identity::Session;
use time::{Duration, OffsetDateTime};

use crate::config::CookieConfig;

const ACCESS_SUFFIX: &str = "access-token";
const REFRESH_SUFFIX: &str = "refresh-token";
const VERIFIER_SUFFIX: &str = "code-verifier";

#[must_use]
pub fn access_cookie_name(config: &CookieConfig) -> String {
    format!("{}-{ACCESS_SUFFIX}", config.prefix)
}

#[must_use]
pub fn refresh_cookie_name(config: &CookieConfig) -> String {
    format!("{}-{REFRESH_SUFFIX}", config.prefix)
}

#[must_use]
pub fn verifier_cookie_name(config: &CookieConfig) -> String {
    format!("{}-{VERIFIER_SUFFIX}", config.prefix)
}

/// Tokens presented by the request. Either may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieTokens {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

impl CookieTokens {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none()
    }
}

fn non_empty_value(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(Cookie::value)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

#[must_use]
pub fn read_tokens(jar: &CookieJar, config: &CookieConfig) -> CookieTokens {
    CookieTokens {
        access: non_empty_value(jar, &access_cookie_name(config)),
        refresh: non_empty_value(jar, &refresh_cookie_name(config)),
    }
}

/// PKCE verifier left by the browser when it started the OAuth flow.
#[must_use]
pub fn code_verifier(jar: &CookieJar, config: &CookieConfig) -> Option<String> {
    non_empty_value(jar, &verifier_cookie_name(config))
}

fn session_cookie(name: String, value: String, config: &CookieConfig, max_age: Duration, now: OffsetDateTime) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .same_site(SameSite::Lax)
        .secure(config.secure)
        .max_age(max_age)
        .expires(now + max_age)
        .build()
}

fn tombstone(name: String, config: &CookieConfig) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .same_site(SameSite::Lax)
        .secure(config.secure)
        .max_age(Duration::ZERO)
        .build()
}

/// Write `session` into the jar, stamped relative to `now`.
#[must_use]
pub fn set_session(jar: CookieJar, config: &CookieConfig, session: &Session, now: OffsetDateTime) -> CookieJar {
    let access = session_cookie(
        access_cookie_name(config),
        session.access_token.clone(),
        config,
        Duration::seconds(session.expires_in.max(0)),
        now,
    );
    let refresh = session_cookie(
        refresh_cookie_name(config),
        session.refresh_token.clone(),
        config,
        Duration::seconds(config.refresh_max_age_secs),
        now,
    );
    jar.add(access).add(refresh)
}

#[must_use]
pub fn clear_session(jar: CookieJar, config: &CookieConfig) -> CookieJar {
    jar.add(tombstone(access_cookie_name(config), config))
        .add(tombstone(refresh_cookie_name(config), config))
}

#[must_use]
pub fn clear_code_verifier(jar: CookieJar, config: &CookieConfig) -> CookieJar {
    jar.add(tombstone(verifier_cookie_name(config), config))
}

/// Whether a response already writes the access cookie.
///
/// The gatekeeper defers to a handler that established a session itself
/// (the OAuth callback) instead of overwriting its cookies.
#[must_use]
pub fn sets_session_cookie(headers: &HeaderMap, config: &CookieConfig) -> bool {
    let prefix = format!("{}=", access_cookie_name(config));
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.starts_with(&prefix))
}

#[cfg(test)]
#[path = "cookies_test.rs"]
mod tests;
