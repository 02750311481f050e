//! Profile store backed by the provider's REST data API (PostgREST).
//!
//! Used by the browser, which has no database connection of its own. The
//! insert asks the API to ignore duplicates and return what it wrote, so an
//! empty answer means another context created the row first.

use std::sync::Arc;

use uuid::Uuid;

use crate::client::AuthClient;
use crate::http::{ProviderConfig, build_http_client};
use crate::model::{NewProfile, Profile};
use crate::profile::{InsertOutcome, ProfileError, ProfileStore};
use crate::provider::ProviderError;

const PROFILE_COLUMNS: &str = "id,username,avatar_url,bio,verified";

pub struct RestProfileStore {
    http: reqwest::Client,
    config: ProviderConfig,
    auth: Option<Arc<AuthClient>>,
}

impl RestProfileStore {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let http = build_http_client(&config)?;
        Ok(Self { http, config, auth: None })
    }

    /// Authorize requests as the signed-in user instead of the anon role.
    #[must_use]
    pub fn with_auth(mut self, auth: Arc<AuthClient>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Token a request is authorized with: an explicit one, else the held
    /// session, else the anon key.
    fn bearer(&self, explicit: Option<&str>) -> String {
        explicit
            .map(str::to_owned)
            .or_else(|| self.auth.as_ref().and_then(|a| a.access_token()))
            .unwrap_or_else(|| self.config.anon_key.clone())
    }

    fn request(&self, method: reqwest::Method, query: &str, bearer: Option<&str>) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}/rest/v1/profiles{query}", self.config.base_url))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(self.bearer(bearer))
    }

    async fn select(&self, id: Uuid, bearer: Option<&str>) -> Result<Option<Profile>, ProfileError> {
        let resp = self
            .request(reqwest::Method::GET, &format!("?id=eq.{id}&select={PROFILE_COLUMNS}&limit=1"), bearer)
            .send()
            .await
            .map_err(|e| transport(&e))?;
        if !resp.status().is_success() {
            return Err(ProfileError::Storage(format!("profile lookup returned {}", resp.status())));
        }
        let rows: Vec<Profile> = resp.json().await.map_err(|e| transport(&e))?;
        Ok(rows.into_iter().next())
    }

    async fn post(&self, profile: &NewProfile, bearer: Option<&str>) -> Result<InsertOutcome, ProfileError> {
        let resp = self
            .request(reqwest::Method::POST, "", bearer)
            .header("Prefer", "resolution=ignore-duplicates,return=representation")
            .json(&[profile])
            .send()
            .await
            .map_err(|e| transport(&e))?;
        if resp.status() == reqwest::StatusCode::CONFLICT {
            return Ok(InsertOutcome::AlreadyExists);
        }
        if !resp.status().is_success() {
            return Err(ProfileError::Storage(format!("profile insert returned {}", resp.status())));
        }
        let written: Vec<serde_json::Value> = resp.json().await.map_err(|e| transport(&e))?;
        Ok(if written.is_empty() { InsertOutcome::AlreadyExists } else { InsertOutcome::Created })
    }
}

fn transport(e: &reqwest::Error) -> ProfileError {
    ProfileError::Transport(e.to_string())
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl ProfileStore for RestProfileStore {
    async fn find(&self, id: Uuid) -> Result<Option<Profile>, ProfileError> {
        self.select(id, None).await
    }

    async fn insert(&self, profile: &NewProfile) -> Result<InsertOutcome, ProfileError> {
        self.post(profile, None).await
    }

    async fn find_as(&self, id: Uuid, access_token: &str) -> Result<Option<Profile>, ProfileError> {
        self.select(id, Some(access_token)).await
    }

    async fn insert_as(&self, profile: &NewProfile, access_token: &str) -> Result<InsertOutcome, ProfileError> {
        self.post(profile, Some(access_token)).await
    }
}

#[cfg(test)]
#[path = "rest_test.rs"]
mod tests;
