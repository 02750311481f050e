//! Browser cookie token store.
//!
//! SYSTEM CONTEXT
//! ==============
//! The server gatekeeper and the browser `AuthClient` share one token pair
//! through `<prefix>-access-token` / `<prefix>-refresh-token`. This store
//! reads and writes them via `document.cookie`, with the same path, SameSite
//! and lifetime rules the server applies.

use identity::{SessionTokens, TokenStore, clock};

/// Access-cookie lifetime when the session carries no expiry.
const FALLBACK_ACCESS_MAX_AGE_SECS: i64 = 3600;

/// Value of cookie `name` in a `document.cookie` style header.
pub(crate) fn cookie_value(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_owned())
        .filter(|v| !v.is_empty())
}

/// A `document.cookie` assignment string.
pub(crate) fn cookie_assignment(name: &str, value: &str, max_age_secs: i64, secure: bool) -> String {
    let mut out = format!("{name}={value}; Path=/; SameSite=Lax; Max-Age={}", max_age_secs.max(0));
    if secure {
        out.push_str("; Secure");
    }
    out
}

/// Token store over `document.cookie`.
#[derive(Debug, Clone)]
pub struct CookieTokenStore {
    prefix: String,
    secure: bool,
    refresh_max_age_secs: i64,
}

impl CookieTokenStore {
    #[must_use]
    pub fn new(prefix: impl Into<String>, secure: bool, refresh_max_age_secs: i64) -> Self {
        Self { prefix: prefix.into(), secure, refresh_max_age_secs }
    }

    fn access_name(&self) -> String {
        format!("{}-access-token", self.prefix)
    }

    fn refresh_name(&self) -> String {
        format!("{}-refresh-token", self.prefix)
    }

    /// Tokens from a cookie header. A lone refresh token comes back marked
    /// expired so the client refreshes before trusting it.
    pub(crate) fn tokens_from_header(&self, header: &str) -> Option<SessionTokens> {
        let refresh_token = cookie_value(header, &self.refresh_name())?;
        match cookie_value(header, &self.access_name()) {
            Some(access_token) => Some(SessionTokens { access_token, refresh_token, expires_at: None }),
            None => Some(SessionTokens { access_token: String::new(), refresh_token, expires_at: Some(0) }),
        }
    }

    /// Assignments that persist `tokens`, relative to `now` (Unix seconds).
    pub(crate) fn save_assignments(&self, tokens: &SessionTokens, now: i64) -> [String; 2] {
        let access_max_age = tokens
            .expires_at
            .map_or(FALLBACK_ACCESS_MAX_AGE_SECS, |at| at - now);
        [
            cookie_assignment(&self.access_name(), &tokens.access_token, access_max_age, self.secure),
            cookie_assignment(&self.refresh_name(), &tokens.refresh_token, self.refresh_max_age_secs, self.secure),
        ]
    }

    pub(crate) fn clear_assignments(&self) -> [String; 2] {
        [
            cookie_assignment(&self.access_name(), "", 0, self.secure),
            cookie_assignment(&self.refresh_name(), "", 0, self.secure),
        ]
    }
}

#[cfg(feature = "hydrate")]
fn html_document() -> Option<web_sys::HtmlDocument> {
    use wasm_bindgen::JsCast;

    web_sys::window()?.document()?.dyn_into::<web_sys::HtmlDocument>().ok()
}

fn read_cookie_header() -> Option<String> {
    #[cfg(feature = "hydrate")]
    {
        html_document()?.cookie().ok()
    }
    #[cfg(not(feature = "hydrate"))]
    {
        None
    }
}

fn write_cookie(assignment: &str) {
    #[cfg(feature = "hydrate")]
    {
        if let Some(doc) = html_document() {
            if let Err(e) = doc.set_cookie(assignment) {
                log::warn!("cookie write failed: {e:?}");
            }
        }
    }
    #[cfg(not(feature = "hydrate"))]
    {
        let _ = assignment;
    }
}

impl TokenStore for CookieTokenStore {
    fn load(&self) -> Option<SessionTokens> {
        self.tokens_from_header(&read_cookie_header()?)
    }

    fn save(&self, tokens: &SessionTokens) {
        for assignment in self.save_assignments(tokens, clock::now_unix()) {
            write_cookie(&assignment);
        }
    }

    fn clear(&self) {
        for assignment in self.clear_assignments() {
            write_cookie(&assignment);
        }
    }
}

#[cfg(test)]
#[path = "cookies_test.rs"]
mod cookies_test;
