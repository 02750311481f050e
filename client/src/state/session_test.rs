use std::sync::Mutex;
use std::time::Duration;

use identity::testing::{self, MemoryProfileStore, MockProvider};
use identity::{IdentityProvider, Profile, Session, SignUpOutcome};
use tokio::sync::Notify;
use tokio::time::timeout;

use super::*;
use crate::util::cache::{CACHED_AT_KEY, DEFAULT_CACHE_TTL_MS, KeyValueStore, MemoryStore, USER_KEY};

#[derive(Default)]
struct RecordingNavigator {
    visits: Mutex<Vec<String>>,
}

impl Navigator for RecordingNavigator {
    fn hard_navigate(&self, path: &str) {
        self.visits.lock().unwrap().push(path.to_owned());
    }
}

/// Provider whose `get_user` waits for a go-ahead.
struct GatedProvider {
    inner: MockProvider,
    gate: Notify,
}

#[async_trait::async_trait]
impl IdentityProvider for GatedProvider {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, ProviderError> {
        self.inner.sign_in_with_password(email, password).await
    }

    async fn sign_up(&self, email: &str, password: &str, metadata: &UserMetadata) -> Result<SignUpOutcome, ProviderError> {
        self.inner.sign_up(email, password, metadata).await
    }

    async fn sign_out(&self, access_token: &str, scope: SignOutScope) -> Result<(), ProviderError> {
        self.inner.sign_out(access_token, scope).await
    }

    async fn get_user(&self, access_token: &str) -> Result<ProviderUser, ProviderError> {
        self.gate.notified().await;
        self.inner.get_user(access_token).await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, ProviderError> {
        self.inner.refresh_session(refresh_token).await
    }

    async fn exchange_code_for_session(&self, code: &str, code_verifier: Option<&str>) -> Result<Session, ProviderError> {
        self.inner.exchange_code_for_session(code, code_verifier).await
    }
}

struct Harness {
    provider: Arc<MockProvider>,
    profiles: Arc<MemoryProfileStore>,
    kv: Arc<MemoryStore>,
    navigator: Arc<RecordingNavigator>,
    auth: Arc<AuthClient>,
    store: Arc<SessionStore>,
}

fn build(provider: Arc<dyn IdentityProvider>, mock: Arc<MockProvider>) -> Harness {
    let profiles = Arc::new(MemoryProfileStore::new());
    let kv = Arc::new(MemoryStore::new());
    let navigator = Arc::new(RecordingNavigator::default());
    let auth = Arc::new(AuthClient::new(provider));
    let store = Arc::new(SessionStore::new(
        auth.clone(),
        profiles.clone(),
        AdvisoryCache::new(kv.clone(), DEFAULT_CACHE_TTL_MS),
        navigator.clone(),
        RouteTable::default(),
    ));
    Harness { provider: mock, profiles, kv, navigator, auth, store }
}

fn harness() -> Harness {
    let mock = Arc::new(MockProvider::new());
    build(mock.clone(), mock)
}

fn signed_in(h: &Harness, email: &str, full_name: &str) -> ProviderUser {
    let user = testing::user(Some(email), Some(full_name));
    h.auth.set_session(h.provider.issue_session(&user));
    user
}

async fn next_state(rx: &mut watch::Receiver<AuthState>) -> AuthState {
    timeout(Duration::from_millis(500), rx.changed())
        .await
        .expect("state change timed out")
        .expect("store dropped");
    rx.borrow_and_update().clone()
}

// =============================================================================
// initialize
// =============================================================================

#[test]
fn starts_loading_without_user() {
    let h = harness();
    assert_eq!(h.store.snapshot(), AuthState { user: None, loading: true });
}

#[tokio::test]
async fn initialize_without_session_settles_signed_out() {
    let h = harness();
    h.store.initialize().await;
    assert_eq!(h.store.snapshot(), AuthState::settled(None));
    assert!(h.kv.get(USER_KEY).is_none());
}

#[tokio::test]
async fn initialize_with_live_session_builds_user_and_caches_it() {
    let h = harness();
    let user = signed_in(&h, "ada@example.com", "Ada Lovelace");

    h.store.initialize().await;

    let state = h.store.snapshot();
    assert!(!state.loading);
    let view = state.user.expect("verified user");
    assert_eq!(view.id, user.id);
    assert_eq!(view.username, "adalovelace");
    assert!(h.kv.get(USER_KEY).is_some());
    assert!(h.kv.get(CACHED_AT_KEY).is_some());
}

#[tokio::test]
async fn initialize_prefers_profile_fields() {
    let h = harness();
    let user = signed_in(&h, "ada@example.com", "Ada Lovelace");
    h.profiles.put(Profile {
        id: user.id,
        username: Some("countess".into()),
        avatar_url: Some("https://img.example/ada.png".into()),
        bio: None,
        verified: false,
    });

    h.store.initialize().await;

    let view = h.store.snapshot().user.unwrap();
    assert_eq!(view.username, "countess");
    assert_eq!(view.avatar_url, "https://img.example/ada.png");
}

#[tokio::test]
async fn revoked_session_clears_cached_user() {
    let h = harness();
    let user = signed_in(&h, "ada@example.com", "Ada Lovelace");
    let cache = AdvisoryCache::new(h.kv.clone(), DEFAULT_CACHE_TTL_MS);
    cache.save(&build_authenticated_user(&user, None), clock::now_millis());
    h.provider
        .sign_out(&h.auth.access_token().unwrap(), SignOutScope::Global)
        .await
        .unwrap();

    h.store.initialize().await;

    assert_eq!(h.store.snapshot(), AuthState::settled(None));
    assert!(h.kv.get(USER_KEY).is_none());
    assert!(h.kv.get(CACHED_AT_KEY).is_none());
}

#[tokio::test]
async fn provider_outage_at_boot_fails_closed() {
    let h = harness();
    signed_in(&h, "ada@example.com", "Ada Lovelace");
    h.provider.set_offline(true);

    h.store.initialize().await;

    assert_eq!(h.store.snapshot(), AuthState::settled(None));
}

#[tokio::test]
async fn cached_user_is_shown_while_still_loading() {
    let mock = Arc::new(MockProvider::new());
    let gated = Arc::new(GatedProvider { inner: MockProvider::new(), gate: Notify::new() });
    let h = build(gated.clone(), mock);
    let user = testing::user(Some("ada@example.com"), Some("Ada Lovelace"));
    h.auth.set_session(gated.inner.issue_session(&user));
    AdvisoryCache::new(h.kv.clone(), DEFAULT_CACHE_TTL_MS).save(&build_authenticated_user(&user, None), clock::now_millis());

    let mut rx = h.store.subscribe();
    let observe = async {
        let seeded = next_state(&mut rx).await;
        assert!(seeded.loading, "cache seed must not settle loading");
        assert_eq!(seeded.user.as_ref().map(|u| u.id), Some(user.id));
        gated.gate.notify_one();
        next_state(&mut rx).await
    };
    let ((), settled) = tokio::join!(h.store.initialize(), observe);

    assert!(!settled.loading);
    assert_eq!(settled.user.map(|u| u.id), Some(user.id));
}

// =============================================================================
// login / register
// =============================================================================

#[tokio::test]
async fn login_success_publishes_user() {
    let h = harness();
    let user = testing::user(Some("ada@example.com"), Some("Ada Lovelace"));
    h.provider.add_account("ada@example.com", "pw", &user, true);

    let view = h.store.login("ada@example.com", "pw").await.unwrap();

    assert_eq!(view.id, user.id);
    assert_eq!(h.store.snapshot(), AuthState::settled(Some(view)));
    assert!(h.auth.get_session().is_some());
}

#[tokio::test]
async fn login_failures_map_to_generic_errors() {
    let h = harness();
    let user = testing::user(Some("new@example.com"), None);
    h.provider.add_account("new@example.com", "pw", &user, false);

    assert_eq!(h.store.login("new@example.com", "pw").await, Err(SessionError::EmailNotConfirmed));
    assert_eq!(h.store.login("new@example.com", "wrong").await, Err(SessionError::InvalidCredentials));

    h.provider.set_offline(true);
    let err = h.store.login("new@example.com", "pw").await.unwrap_err();
    assert_eq!(err, SessionError::Unavailable);
    assert!(!err.to_string().contains("mock"));

    let state = h.store.snapshot();
    assert!(!state.loading);
    assert!(state.user.is_none());
}

#[tokio::test]
async fn register_defers_profile_until_first_sign_in() {
    let h = harness();

    let reg = h.store.register("grace@example.com", "pw", "  amazing_grace ").await.unwrap();

    assert!(reg.needs_confirmation);
    assert!(h.profiles.get(reg.user_id).is_none());
    assert!(h.auth.get_session().is_none());
    assert_eq!(h.store.snapshot().user, None);

    h.provider.confirm_email("grace@example.com");
    let view = h.store.login("grace@example.com", "pw").await.unwrap();

    let profile = h.profiles.get(reg.user_id).expect("profile provisioned at first sign-in");
    assert_eq!(profile.username.as_deref(), Some("amazing_grace"));
    assert_eq!(view.username, "amazing_grace");
}

#[tokio::test]
async fn register_writes_profile_as_the_new_account() {
    let h = harness();
    signed_in(&h, "ada@example.com", "Ada Lovelace");
    let held = h.auth.access_token().unwrap();
    h.provider.set_auto_confirm(true);

    let reg = h.store.register("grace@example.com", "pw", "grace").await.unwrap();

    let tokens = h.profiles.insert_tokens();
    assert_eq!(tokens.len(), 1);
    let used = tokens[0].clone().expect("insert must carry the new account's token");
    assert_ne!(used, held);
    assert!(h.provider.is_live(&used));
    assert_eq!(h.profiles.get(reg.user_id).unwrap().username.as_deref(), Some("grace"));
    assert_eq!(h.auth.access_token(), Some(held));
}

#[tokio::test]
async fn register_with_auto_confirm_still_does_not_adopt_session() {
    let h = harness();
    h.provider.set_auto_confirm(true);

    let reg = h.store.register("grace@example.com", "pw", "grace").await.unwrap();

    assert!(!reg.needs_confirmation);
    assert!(h.auth.get_session().is_none());
}

#[tokio::test]
async fn register_duplicate_email_fails() {
    let h = harness();
    h.store.register("grace@example.com", "pw", "grace").await.unwrap();
    assert_eq!(
        h.store.register("grace@example.com", "pw", "grace2").await,
        Err(SessionError::Registration)
    );
}

#[tokio::test]
async fn register_survives_profile_store_failure() {
    let h = harness();
    h.provider.set_auto_confirm(true);
    h.profiles.set_failing(true);
    assert!(h.store.register("grace@example.com", "pw", "grace").await.is_ok());
}

// =============================================================================
// logout
// =============================================================================

#[tokio::test]
async fn logout_revokes_clears_and_reloads() {
    let h = harness();
    signed_in(&h, "ada@example.com", "Ada Lovelace");
    let access = h.auth.access_token().unwrap();
    h.store.initialize().await;

    h.store.logout().await;

    assert!(!h.provider.is_live(&access));
    assert_eq!(h.store.snapshot(), AuthState::settled(None));
    assert!(h.kv.get(USER_KEY).is_none());
    assert_eq!(*h.navigator.visits.lock().unwrap(), vec!["/login".to_owned()]);
}

#[tokio::test]
async fn logout_clears_even_when_provider_fails() {
    let h = harness();
    signed_in(&h, "ada@example.com", "Ada Lovelace");
    h.store.initialize().await;
    h.provider.set_sign_out_fails(true);

    h.store.logout().await;

    assert_eq!(h.store.snapshot(), AuthState::settled(None));
    assert!(h.auth.get_session().is_none());
    assert_eq!(h.navigator.visits.lock().unwrap().len(), 1);
}

// =============================================================================
// events + teardown
// =============================================================================

#[tokio::test]
async fn listener_follows_sign_in_and_sign_out() {
    let h = harness();
    let mut rx = h.store.subscribe();
    let listener = tokio::spawn({
        let store = h.store.clone();
        let subscription = h.auth.on_auth_state_change();
        async move { store.listen(subscription).await }
    });

    let user = testing::user(Some("ada@example.com"), Some("Ada Lovelace"));
    h.auth.set_session(h.provider.issue_session(&user));
    let state = next_state(&mut rx).await;
    assert_eq!(state.user.map(|u| u.id), Some(user.id));

    h.auth.sign_out(SignOutScope::Local).await.unwrap();
    assert_eq!(next_state(&mut rx).await, AuthState::settled(None));

    h.store.teardown();
    timeout(Duration::from_millis(500), listener)
        .await
        .expect("listener should stop after teardown")
        .unwrap();
}

#[tokio::test]
async fn token_refresh_rebuilds_from_profile() {
    let h = harness();
    let user = testing::user(Some("ada@example.com"), None);
    h.profiles.put(Profile { id: user.id, username: Some("ada".into()), avatar_url: None, bio: None, verified: false });

    h.store.handle_event(AuthEvent::TokenRefreshed(h.provider.issue_session(&user))).await;

    assert_eq!(h.store.snapshot().user.unwrap().username, "ada");
}

#[tokio::test]
async fn events_after_teardown_are_ignored() {
    let h = harness();
    h.store.teardown();

    let user = testing::user(Some("ada@example.com"), None);
    h.store.handle_event(AuthEvent::SignedIn(h.provider.issue_session(&user))).await;

    assert_eq!(h.store.snapshot(), AuthState::default());
    assert!(h.kv.get(USER_KEY).is_none());
}

/// Profile store whose lookups wait for a go-ahead.
struct GatedProfiles {
    inner: MemoryProfileStore,
    entered: Notify,
    release: Notify,
}

#[async_trait::async_trait]
impl ProfileStore for GatedProfiles {
    async fn find(&self, id: Uuid) -> Result<Option<Profile>, identity::ProfileError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.find(id).await
    }

    async fn insert(&self, profile: &identity::NewProfile) -> Result<identity::InsertOutcome, identity::ProfileError> {
        self.inner.insert(profile).await
    }
}

#[tokio::test]
async fn sign_out_wins_over_a_slower_sign_in_event() {
    let provider = Arc::new(MockProvider::new());
    let profiles = Arc::new(GatedProfiles { inner: MemoryProfileStore::new(), entered: Notify::new(), release: Notify::new() });
    let kv = Arc::new(MemoryStore::new());
    let store = Arc::new(SessionStore::new(
        Arc::new(AuthClient::new(provider.clone())),
        profiles.clone(),
        AdvisoryCache::new(kv.clone(), DEFAULT_CACHE_TTL_MS),
        Arc::new(RecordingNavigator::default()),
        RouteTable::default(),
    ));
    let user = testing::user(Some("ada@example.com"), None);

    let pending = tokio::spawn({
        let store = store.clone();
        let event = AuthEvent::SignedIn(provider.issue_session(&user));
        async move { store.handle_event(event).await }
    });
    profiles.entered.notified().await;
    store.logout().await;
    profiles.release.notify_one();
    pending.await.unwrap();

    assert_eq!(store.snapshot(), AuthState::settled(None));
    assert!(kv.get(USER_KEY).is_none());
    assert!(kv.get(CACHED_AT_KEY).is_none());

    // A sign-in after the sign-out is applied as usual.
    profiles.release.notify_one();
    store.handle_event(AuthEvent::SignedIn(provider.issue_session(&user))).await;
    assert_eq!(store.snapshot().user.map(|u| u.id), Some(user.id));
    assert!(kv.get(USER_KEY).is_some());
}

#[tokio::test]
async fn teardown_before_listen_returns_immediately() {
    let h = harness();
    h.store.teardown();
    timeout(Duration::from_millis(500), h.store.listen(h.auth.on_auth_state_change()))
        .await
        .expect("listen should not block after teardown");
}

#[test]
fn dropping_guard_tears_down() {
    let h = harness();
    let guard = h.store.teardown_guard();
    assert!(h.store.is_alive());
    drop(guard);
    assert!(!h.store.is_alive());
}
