//! In-memory fakes for the provider and profile seams.
//!
//! Enabled with the `test-util` feature so `server` and `client` tests can
//! drive the real session logic without a hosted provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use crate::clock;
use crate::model::{NewProfile, Profile, ProviderUser, Session, UserMetadata};
use crate::profile::{InsertOutcome, ProfileError, ProfileStore};
use crate::provider::{IdentityProvider, ProviderError, SignOutScope, SignUpOutcome};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Build a provider user with the given email and display name.
#[must_use]
pub fn user(email: Option<&str>, full_name: Option<&str>) -> ProviderUser {
    ProviderUser {
        id: Uuid::new_v4(),
        email: email.map(str::to_owned),
        user_metadata: UserMetadata { full_name: full_name.map(str::to_owned), ..UserMetadata::default() },
    }
}

struct Account {
    password: String,
    user: ProviderUser,
    confirmed: bool,
}

// =============================================================================
// MockProvider
// =============================================================================

/// Scriptable identity provider.
#[derive(Default)]
pub struct MockProvider {
    access: Mutex<HashMap<String, ProviderUser>>,
    refresh: Mutex<HashMap<String, ProviderUser>>,
    codes: Mutex<HashMap<String, ProviderUser>>,
    accounts: Mutex<HashMap<String, Account>>,
    calls: Mutex<Vec<&'static str>>,
    counter: AtomicU64,
    offline: AtomicBool,
    sign_out_fails: AtomicBool,
    auto_confirm: AtomicBool,
}

impl MockProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a session for `user` whose tokens the mock will accept.
    pub fn issue_session(&self, user: &ProviderUser) -> Session {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let access_token = format!("access-{n}");
        let refresh_token = format!("refresh-{n}");
        lock(&self.access).insert(access_token.clone(), user.clone());
        lock(&self.refresh).insert(refresh_token.clone(), user.clone());
        Session {
            access_token,
            refresh_token,
            expires_in: 3600,
            expires_at: Some(clock::now_unix() + 3600),
            user: user.clone(),
        }
    }

    /// Register a password account.
    pub fn add_account(&self, email: &str, password: &str, user: &ProviderUser, confirmed: bool) {
        lock(&self.accounts).insert(
            email.to_owned(),
            Account { password: password.to_owned(), user: user.clone(), confirmed },
        );
    }

    /// Register a one-time authorization code for `user`.
    pub fn add_code(&self, code: &str, user: &ProviderUser) {
        lock(&self.codes).insert(code.to_owned(), user.clone());
    }

    /// Invalidate an access token server-side while keeping its refresh token.
    pub fn expire_access(&self, access_token: &str) {
        lock(&self.access).remove(access_token);
    }

    /// Make every call fail as if the provider were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_sign_out_fails(&self, fails: bool) {
        self.sign_out_fails.store(fails, Ordering::SeqCst);
    }

    /// Mark a signed-up account as confirmed, as following the emailed link would.
    pub fn confirm_email(&self, email: &str) {
        if let Some(account) = lock(&self.accounts).get_mut(email) {
            account.confirmed = true;
        }
    }

    /// Return a session from sign-up instead of requiring email confirmation.
    pub fn set_auto_confirm(&self, auto: bool) {
        self.auto_confirm.store(auto, Ordering::SeqCst);
    }

    /// Names of the trait methods called so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<&'static str> {
        lock(&self.calls).clone()
    }

    /// Whether `access_token` is currently accepted.
    #[must_use]
    pub fn is_live(&self, access_token: &str) -> bool {
        lock(&self.access).contains_key(access_token)
    }

    fn record(&self, call: &'static str) -> Result<(), ProviderError> {
        lock(&self.calls).push(call);
        if self.offline.load(Ordering::SeqCst) {
            return Err(ProviderError::Transport("mock provider offline".into()));
        }
        Ok(())
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl IdentityProvider for MockProvider {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, ProviderError> {
        self.record("sign_in_with_password")?;
        let user = {
            let accounts = lock(&self.accounts);
            let account = accounts
                .get(email)
                .filter(|a| a.password == password)
                .ok_or(ProviderError::InvalidCredentials)?;
            if !account.confirmed {
                return Err(ProviderError::EmailNotConfirmed);
            }
            account.user.clone()
        };
        Ok(self.issue_session(&user))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> Result<SignUpOutcome, ProviderError> {
        self.record("sign_up")?;
        if lock(&self.accounts).contains_key(email) {
            return Err(ProviderError::Api { status: 422, message: "User already registered".into() });
        }
        let user = ProviderUser { id: Uuid::new_v4(), email: Some(email.to_owned()), user_metadata: metadata.clone() };
        let confirmed = self.auto_confirm.load(Ordering::SeqCst);
        self.add_account(email, password, &user, confirmed);
        let session = confirmed.then(|| self.issue_session(&user));
        Ok(SignUpOutcome { user, session })
    }

    async fn sign_out(&self, access_token: &str, scope: SignOutScope) -> Result<(), ProviderError> {
        self.record("sign_out")?;
        if self.sign_out_fails.load(Ordering::SeqCst) {
            return Err(ProviderError::Api { status: 500, message: "sign-out failed".into() });
        }
        let owner = lock(&self.access)
            .get(access_token)
            .map(|u| u.id)
            .ok_or(ProviderError::Unauthorized)?;
        match scope {
            SignOutScope::Global => {
                lock(&self.access).retain(|_, u| u.id != owner);
                lock(&self.refresh).retain(|_, u| u.id != owner);
            }
            SignOutScope::Local => {
                lock(&self.access).remove(access_token);
            }
        }
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> Result<ProviderUser, ProviderError> {
        self.record("get_user")?;
        lock(&self.access)
            .get(access_token)
            .cloned()
            .ok_or(ProviderError::Unauthorized)
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, ProviderError> {
        self.record("refresh_session")?;
        let user = lock(&self.refresh)
            .remove(refresh_token)
            .ok_or_else(|| ProviderError::InvalidGrant("refresh_token_not_found".into()))?;
        Ok(self.issue_session(&user))
    }

    async fn exchange_code_for_session(
        &self,
        code: &str,
        _code_verifier: Option<&str>,
    ) -> Result<Session, ProviderError> {
        self.record("exchange_code_for_session")?;
        let user = lock(&self.codes)
            .remove(code)
            .ok_or_else(|| ProviderError::InvalidGrant("flow_state_not_found".into()))?;
        Ok(self.issue_session(&user))
    }
}

// =============================================================================
// MemoryProfileStore
// =============================================================================

/// Profile store with a uniqueness constraint on id.
#[derive(Default)]
pub struct MemoryProfileStore {
    rows: Mutex<HashMap<Uuid, Profile>>,
    inserts: AtomicU64,
    insert_tokens: Mutex<Vec<Option<String>>>,
    failing: AtomicBool,
    blind_reads: AtomicBool,
}

impl MemoryProfileStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, profile: Profile) {
        lock(&self.rows).insert(profile.id, profile);
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<Profile> {
        lock(&self.rows).get(&id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of insert attempts, including duplicates.
    #[must_use]
    pub fn insert_attempts(&self) -> u64 {
        self.inserts.load(Ordering::SeqCst)
    }

    /// Explicit access token of every insert so far; `None` for inserts made
    /// with the store's ambient credentials.
    #[must_use]
    pub fn insert_tokens(&self) -> Vec<Option<String>> {
        lock(&self.insert_tokens).clone()
    }

    /// Make every call fail with a storage error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make lookups miss, reproducing the check-then-insert race window.
    pub fn set_blind_reads(&self, blind: bool) {
        self.blind_reads.store(blind, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ProfileError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProfileError::Storage("memory store failing".into()));
        }
        Ok(())
    }

    fn write(&self, profile: &NewProfile, access_token: Option<&str>) -> Result<InsertOutcome, ProfileError> {
        self.check()?;
        self.inserts.fetch_add(1, Ordering::SeqCst);
        lock(&self.insert_tokens).push(access_token.map(str::to_owned));
        let mut rows = lock(&self.rows);
        if rows.contains_key(&profile.id) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        rows.insert(
            profile.id,
            Profile {
                id: profile.id,
                username: Some(profile.username.clone()),
                avatar_url: Some(profile.avatar_url.clone()),
                bio: Some(profile.bio.clone()),
                verified: profile.verified,
            },
        );
        Ok(InsertOutcome::Created)
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl ProfileStore for MemoryProfileStore {
    async fn find(&self, id: Uuid) -> Result<Option<Profile>, ProfileError> {
        self.check()?;
        if self.blind_reads.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.get(id))
    }

    async fn insert(&self, profile: &NewProfile) -> Result<InsertOutcome, ProfileError> {
        self.write(profile, None)
    }

    async fn insert_as(&self, profile: &NewProfile, access_token: &str) -> Result<InsertOutcome, ProfileError> {
        self.write(profile, Some(access_token))
    }
}
