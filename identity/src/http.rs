//! HTTP client for a GoTrue-compatible hosted identity provider.
//!
//! ERROR HANDLING
//! ==============
//! Provider error bodies come in several shapes (`error_code`/`msg`,
//! `error`/`error_description`). [`classify_error`] folds them into
//! [`ProviderError`] so callers branch on kinds, never on provider text.
//! 5xx answers are grouped with network failures as transport errors.

use serde::Deserialize;
use serde_json::json;

use crate::clock;
use crate::model::{ProviderUser, Session, UserMetadata};
use crate::provider::{IdentityProvider, ProviderError, SignOutScope, SignUpOutcome};

pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;

const GRANT_ERROR_CODES: &[&str] = &[
    "invalid_grant",
    "flow_state_not_found",
    "flow_state_expired",
    "bad_code_verifier",
    "refresh_token_not_found",
    "refresh_token_already_used",
];

#[derive(Debug, thiserror::Error)]
pub enum ProviderConfigError {
    #[error("missing required environment variable {var}")]
    Missing { var: &'static str },
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

/// Connection settings for the hosted provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Project base URL, without trailing slash.
    pub base_url: String,
    /// Public (anon) API key sent as `apikey` on every call.
    pub anon_key: String,
    pub request_timeout_secs: u64,
}

impl ProviderConfig {
    /// Build from configuration variables resolved through `lookup`
    /// (usually `std::env::var`).
    ///
    /// Required:
    /// - `IDENTITY_URL`
    /// - `IDENTITY_ANON_KEY`
    ///
    /// Optional:
    /// - `IDENTITY_TIMEOUT_SECS`: default 30
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or the timeout is not a number.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ProviderConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("IDENTITY_URL").ok_or(ProviderConfigError::Missing { var: "IDENTITY_URL" })?;
        let anon_key = lookup("IDENTITY_ANON_KEY").ok_or(ProviderConfigError::Missing { var: "IDENTITY_ANON_KEY" })?;
        let request_timeout_secs = match lookup("IDENTITY_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ProviderConfigError::Invalid { var: "IDENTITY_TIMEOUT_SECS", value: raw })?,
            None => DEFAULT_PROVIDER_TIMEOUT_SECS,
        };
        Ok(Self::new(base_url, anon_key).with_timeout(request_timeout_secs))
    }

    #[must_use]
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            anon_key: anon_key.into(),
            request_timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }
}

/// Build the shared `reqwest` client with the configured timeout.
pub(crate) fn build_http_client(config: &ProviderConfig) -> Result<reqwest::Client, ProviderError> {
    let builder = reqwest::Client::builder();
    #[cfg(not(target_arch = "wasm32"))]
    let builder = builder.timeout(std::time::Duration::from_secs(config.request_timeout_secs));
    #[cfg(target_arch = "wasm32")]
    let _ = config;
    builder.build().map_err(|e| ProviderError::Transport(e.to_string()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    error_code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

/// Map a non-success provider response to a [`ProviderError`].
pub(crate) fn classify_error(status: u16, body: &str) -> ProviderError {
    if status >= 500 {
        return ProviderError::Transport(format!("provider returned {status}"));
    }

    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.error_code.or(parsed.error).unwrap_or_default();
    let message = parsed
        .msg
        .or(parsed.message)
        .or(parsed.error_description)
        .unwrap_or_else(|| body.to_owned());
    let lowered = message.to_ascii_lowercase();

    if code == "email_not_confirmed" || lowered.contains("email not confirmed") {
        return ProviderError::EmailNotConfirmed;
    }
    if code == "invalid_credentials" || lowered.contains("invalid login credentials") {
        return ProviderError::InvalidCredentials;
    }
    if GRANT_ERROR_CODES.contains(&code.as_str()) {
        return ProviderError::InvalidGrant(code);
    }
    if status == 401 || status == 403 {
        return ProviderError::Unauthorized;
    }
    ProviderError::Api { status, message }
}

/// Stamp an absolute expiry on sessions the provider returned without one.
pub(crate) fn stamp_expiry(mut session: Session) -> Session {
    if session.expires_at.is_none() {
        session.expires_at = Some(session.expiry(clock::now_unix()));
    }
    session
}

/// Identity provider reached over its REST API.
pub struct HttpIdentityProvider {
    http: reqwest::Client,
    config: ProviderConfig,
}

impl HttpIdentityProvider {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let http = build_http_client(&config)?;
        Ok(Self { http, config })
    }

    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}/auth/v1/{path}", self.config.base_url))
            .header("apikey", &self.config.anon_key)
    }

    async fn send(builder: reqwest::RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        let resp = builder
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        let err = classify_error(status, &body);
        tracing::debug!(status, error = %err, "identity provider rejected request");
        Err(err)
    }

    async fn token_grant(&self, grant_type: &str, body: serde_json::Value) -> Result<Session, ProviderError> {
        let builder = self
            .request(reqwest::Method::POST, &format!("token?grant_type={grant_type}"))
            .json(&body);
        let session = Self::send(builder)
            .await?
            .json::<Session>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(stamp_expiry(session))
    }
}

/// Sign-up answers with a session when auto-confirm is on, a bare user otherwise.
pub(crate) fn parse_sign_up(body: serde_json::Value) -> Result<SignUpOutcome, ProviderError> {
    if body.get("access_token").is_some() {
        let session: Session = serde_json::from_value(body).map_err(|e| ProviderError::Decode(e.to_string()))?;
        let session = stamp_expiry(session);
        return Ok(SignUpOutcome { user: session.user.clone(), session: Some(session) });
    }
    let user: ProviderUser = serde_json::from_value(body).map_err(|e| ProviderError::Decode(e.to_string()))?;
    Ok(SignUpOutcome { user, session: None })
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl IdentityProvider for HttpIdentityProvider {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, ProviderError> {
        self.token_grant("password", json!({ "email": email, "password": password }))
            .await
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> Result<SignUpOutcome, ProviderError> {
        let builder = self
            .request(reqwest::Method::POST, "signup")
            .json(&json!({ "email": email, "password": password, "data": metadata }));
        let body = Self::send(builder)
            .await?
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        parse_sign_up(body)
    }

    async fn sign_out(&self, access_token: &str, scope: SignOutScope) -> Result<(), ProviderError> {
        let builder = self
            .request(reqwest::Method::POST, &format!("logout?scope={}", scope.as_str()))
            .bearer_auth(access_token);
        Self::send(builder).await?;
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> Result<ProviderUser, ProviderError> {
        let builder = self
            .request(reqwest::Method::GET, "user")
            .bearer_auth(access_token);
        Self::send(builder)
            .await?
            .json::<ProviderUser>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, ProviderError> {
        self.token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn exchange_code_for_session(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Session, ProviderError> {
        let mut body = json!({ "auth_code": code });
        if let Some(verifier) = code_verifier {
            body["code_verifier"] = json!(verifier);
        }
        self.token_grant("pkce", body).await
    }
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
