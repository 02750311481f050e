//! Profile derivation and lazy provisioning.
//!
//! SYSTEM CONTEXT
//! ==============
//! Both the OAuth callback (server) and registration (client) create the
//! profile row the first time an identity is seen, with identical derivation
//! rules. Both also rebuild the [`AuthenticatedUser`] view from the same
//! inputs, so they live here.
//!
//! TRADE-OFFS
//! ==========
//! Provisioning is check-then-insert. Two first logins racing (two tabs) can
//! both miss the lookup; the store's uniqueness constraint on `id` decides,
//! and the loser reports [`InsertOutcome::AlreadyExists`], which callers treat
//! as success.
//!
//! A row is written as the identity it belongs to. When that identity is not
//! the session a store would otherwise use (a sign-up whose session is not
//! adopted), the seed carries its access token and provisioning goes through
//! [`ProfileStore::find_as`] and [`ProfileStore::insert_as`].

use rand::Rng;
use uuid::Uuid;

use crate::model::{AuthenticatedUser, NewProfile, Profile, ProviderUser};

pub const DEFAULT_BIO: &str = "Hello! I'm new here.";
pub const PLACEHOLDER_AVATAR_BASE: &str = "https://api.dicebear.com/7.x/identicon/svg?seed=";

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const PLACEHOLDER_SUFFIX_LEN: usize = 9;

/// Outcome of a profile insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created,
    /// A row with the same id already existed; nothing was written.
    AlreadyExists,
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("profile storage error: {0}")]
    Storage(String),
    #[error("profile store unreachable: {0}")]
    Transport(String),
}

/// Persistent profile store keyed by user id.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait ProfileStore: Send + Sync {
    /// Look up a profile by user id.
    ///
    /// # Errors
    ///
    /// Returns a [`ProfileError`] if the store cannot be queried.
    async fn find(&self, id: Uuid) -> Result<Option<Profile>, ProfileError>;

    /// Insert a profile, reporting an existing row as [`InsertOutcome::AlreadyExists`].
    ///
    /// # Errors
    ///
    /// Returns a [`ProfileError`] for any failure other than a duplicate id.
    async fn insert(&self, profile: &NewProfile) -> Result<InsertOutcome, ProfileError>;

    /// [`Self::find`] authorized by `access_token` instead of the store's
    /// ambient credentials. Stores without per-user authorization ignore it.
    ///
    /// # Errors
    ///
    /// As [`Self::find`].
    async fn find_as(&self, id: Uuid, access_token: &str) -> Result<Option<Profile>, ProfileError> {
        let _ = access_token;
        self.find(id).await
    }

    /// [`Self::insert`] authorized by `access_token`.
    ///
    /// # Errors
    ///
    /// As [`Self::insert`].
    async fn insert_as(&self, profile: &NewProfile, access_token: &str) -> Result<InsertOutcome, ProfileError> {
        let _ = access_token;
        self.insert(profile).await
    }
}

/// Inputs for profile derivation.
#[derive(Debug, Clone, Copy)]
pub struct ProfileSeed<'a> {
    pub user: &'a ProviderUser,
    /// Username typed at registration; wins over every claim.
    pub requested_username: Option<&'a str>,
    /// Credentials of `user`, when they differ from the store's own.
    pub access_token: Option<&'a str>,
}

impl<'a> ProfileSeed<'a> {
    #[must_use]
    pub fn from_user(user: &'a ProviderUser) -> Self {
        Self { user, requested_username: None, access_token: None }
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Remove all whitespace and lower-case: `"Ada Lovelace"` -> `"adalovelace"`.
fn compact_lowercase(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn email_local_part(email: &str) -> Option<&str> {
    email.split('@').next().and_then(non_empty)
}

/// `user_` followed by nine random base36 characters.
#[must_use]
pub fn placeholder_username() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..PLACEHOLDER_SUFFIX_LEN)
        .map(|_| char::from(BASE36[rng.random_range(0..BASE36.len())]))
        .collect();
    format!("user_{suffix}")
}

/// Deterministic placeholder avatar for `id`.
#[must_use]
pub fn placeholder_avatar(id: Uuid) -> String {
    format!("{PLACEHOLDER_AVATAR_BASE}{id}")
}

/// Username from social display name, else email local part.
fn claimed_username(user: &ProviderUser) -> Option<String> {
    if let Some(name) = user.user_metadata.display_name() {
        let compact = compact_lowercase(name);
        if !compact.is_empty() {
            return Some(compact);
        }
    }
    user.email
        .as_deref()
        .and_then(email_local_part)
        .map(str::to_owned)
}

/// Username for a new profile row. A username chosen at sign-up (passed in
/// directly or carried in the sign-up metadata) wins over every claim.
#[must_use]
pub fn derive_username(seed: ProfileSeed<'_>) -> String {
    seed.requested_username
        .and_then(non_empty)
        .or_else(|| seed.user.user_metadata.username.as_deref().and_then(non_empty))
        .map(str::to_owned)
        .or_else(|| claimed_username(seed.user))
        .unwrap_or_else(placeholder_username)
}

/// Avatar for a new profile row.
#[must_use]
pub fn derive_avatar(user: &ProviderUser) -> String {
    user.user_metadata
        .avatar()
        .map_or_else(|| placeholder_avatar(user.id), str::to_owned)
}

/// Full row for a first-seen identity.
#[must_use]
pub fn new_profile(seed: ProfileSeed<'_>) -> NewProfile {
    NewProfile {
        id: seed.user.id,
        username: derive_username(seed),
        avatar_url: derive_avatar(seed.user),
        bio: DEFAULT_BIO.to_owned(),
        verified: false,
    }
}

/// Create the profile row for `seed.user` unless one exists.
///
/// # Errors
///
/// Returns a [`ProfileError`] if the lookup or insert fails. Callers log it
/// and carry on: a missing profile only degrades the view model.
pub async fn provision_profile(store: &dyn ProfileStore, seed: ProfileSeed<'_>) -> Result<InsertOutcome, ProfileError> {
    let existing = match seed.access_token {
        Some(token) => store.find_as(seed.user.id, token).await?,
        None => store.find(seed.user.id).await?,
    };
    if existing.is_some() {
        return Ok(InsertOutcome::AlreadyExists);
    }
    let row = new_profile(seed);
    let outcome = match seed.access_token {
        Some(token) => store.insert_as(&row, token).await?,
        None => store.insert(&row).await?,
    };
    match outcome {
        InsertOutcome::Created => tracing::info!(user_id = %row.id, username = %row.username, "profile created"),
        InsertOutcome::AlreadyExists => {
            tracing::debug!(user_id = %row.id, "profile created concurrently; keeping existing row");
        }
    }
    Ok(outcome)
}

/// Join provider claims with the stored profile. Profile fields win.
#[must_use]
pub fn build_authenticated_user(user: &ProviderUser, profile: Option<&Profile>) -> AuthenticatedUser {
    let username = profile
        .and_then(|p| p.username.as_deref())
        .and_then(non_empty)
        .map(str::to_owned)
        .or_else(|| {
            user.user_metadata
                .username
                .as_deref()
                .and_then(non_empty)
                .map(str::to_owned)
        })
        .or_else(|| claimed_username(user))
        .unwrap_or_else(|| format!("user_{}", &user.id.simple().to_string()[..PLACEHOLDER_SUFFIX_LEN]));

    let avatar_url = profile
        .and_then(|p| p.avatar_url.as_deref())
        .and_then(non_empty)
        .map_or_else(|| derive_avatar(user), str::to_owned);

    AuthenticatedUser { id: user.id, email: user.email.clone(), username, avatar_url }
}

#[cfg(test)]
#[path = "profile_test.rs"]
mod tests;
