use std::sync::Mutex;

use super::*;
use crate::testing::{MockProvider, user};

#[derive(Default)]
struct RecordingTokenStore {
    tokens: Mutex<Option<SessionTokens>>,
}

impl TokenStore for RecordingTokenStore {
    fn load(&self) -> Option<SessionTokens> {
        self.tokens.lock().unwrap().clone()
    }

    fn save(&self, tokens: &SessionTokens) {
        *self.tokens.lock().unwrap() = Some(tokens.clone());
    }

    fn clear(&self) {
        *self.tokens.lock().unwrap() = None;
    }
}

fn client(provider: &Arc<MockProvider>) -> AuthClient {
    AuthClient::new(provider.clone())
}

#[tokio::test]
async fn get_user_without_session_is_none_and_skips_provider() {
    let provider = Arc::new(MockProvider::new());
    let auth = client(&provider);
    assert!(auth.get_user().await.unwrap().is_none());
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn sign_in_stores_session_and_emits_signed_in() {
    let provider = Arc::new(MockProvider::new());
    let ada = user(Some("ada@example.com"), None);
    provider.add_account("ada@example.com", "pw", &ada, true);
    let auth = client(&provider);
    let mut events = auth.on_auth_state_change();

    let session = auth.sign_in_with_password("ada@example.com", "pw").await.unwrap();

    assert_eq!(auth.access_token(), Some(session.access_token.clone()));
    assert_eq!(events.recv().await, Some(AuthEvent::SignedIn(session)));
}

#[tokio::test]
async fn sign_in_failure_keeps_previous_session() {
    let provider = Arc::new(MockProvider::new());
    let ada = user(Some("ada@example.com"), None);
    let auth = client(&provider);
    auth.set_session(provider.issue_session(&ada));
    let before = auth.get_session();

    let err = auth.sign_in_with_password("ada@example.com", "wrong").await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidCredentials));
    assert_eq!(auth.get_session(), before);
}

#[tokio::test]
async fn get_user_verifies_live() {
    let provider = Arc::new(MockProvider::new());
    let ada = user(Some("ada@example.com"), None);
    let auth = client(&provider);
    auth.set_session(provider.issue_session(&ada));

    let verified = auth.get_user().await.unwrap().unwrap();
    assert_eq!(verified.id, ada.id);
    assert_eq!(provider.calls(), vec!["get_user"]);
}

#[tokio::test]
async fn get_user_refreshes_rejected_access_token() {
    let provider = Arc::new(MockProvider::new());
    let ada = user(Some("ada@example.com"), None);
    let auth = client(&provider);
    let session = provider.issue_session(&ada);
    provider.expire_access(&session.access_token);
    auth.set_session(session.clone());
    let mut events = auth.on_auth_state_change();

    let verified = auth.get_user().await.unwrap().unwrap();

    assert_eq!(verified.id, ada.id);
    assert_ne!(auth.access_token(), Some(session.access_token));
    assert!(matches!(events.recv().await, Some(AuthEvent::TokenRefreshed(_))));
}

#[tokio::test]
async fn get_user_drops_session_when_refresh_rejected() {
    let provider = Arc::new(MockProvider::new());
    let auth = client(&provider);
    auth.set_session(Session {
        access_token: "forged".into(),
        refresh_token: "forged".into(),
        expires_in: 3600,
        expires_at: None,
        user: user(None, None),
    });
    let mut events = auth.on_auth_state_change();

    assert!(auth.get_user().await.unwrap().is_none());
    assert!(auth.get_session().is_none());
    assert_eq!(events.recv().await, Some(AuthEvent::SignedOut));
}

#[tokio::test]
async fn get_user_transport_error_keeps_session() {
    let provider = Arc::new(MockProvider::new());
    let ada = user(None, None);
    let auth = client(&provider);
    auth.set_session(provider.issue_session(&ada));
    provider.set_offline(true);

    let err = auth.get_user().await.unwrap_err();
    assert!(matches!(err, ProviderError::Transport(_)));
    assert!(auth.get_session().is_some());
}

#[tokio::test]
async fn expired_tokens_go_straight_to_refresh() {
    let provider = Arc::new(MockProvider::new());
    let ada = user(None, None);
    let auth = client(&provider);
    let mut session = provider.issue_session(&ada);
    session.expires_at = Some(0);
    auth.set_session(session);

    assert!(auth.get_user().await.unwrap().is_some());
    assert_eq!(provider.calls(), vec!["refresh_session"]);
}

#[tokio::test]
async fn sign_out_clears_locally_even_when_provider_fails() {
    let provider = Arc::new(MockProvider::new());
    let ada = user(None, None);
    let auth = client(&provider);
    auth.set_session(provider.issue_session(&ada));
    provider.set_sign_out_fails(true);
    let mut events = auth.on_auth_state_change();

    assert!(auth.sign_out(SignOutScope::Global).await.is_err());
    assert!(auth.get_session().is_none());
    assert_eq!(events.recv().await, Some(AuthEvent::SignedOut));
}

#[tokio::test]
async fn global_sign_out_revokes_other_sessions() {
    let provider = Arc::new(MockProvider::new());
    let ada = user(None, None);
    let other_tab = provider.issue_session(&ada);
    let auth = client(&provider);
    auth.set_session(provider.issue_session(&ada));

    auth.sign_out(SignOutScope::Global).await.unwrap();
    assert!(!provider.is_live(&other_tab.access_token));
}

#[tokio::test]
async fn sign_up_does_not_adopt_session() {
    let provider = Arc::new(MockProvider::new());
    provider.set_auto_confirm(true);
    let auth = client(&provider);

    let outcome = auth
        .sign_up("ada@example.com", "pw", &UserMetadata::default())
        .await
        .unwrap();
    assert!(outcome.session.is_some());
    assert!(auth.get_session().is_none());
}

#[tokio::test]
async fn token_store_is_restored_and_mirrored() {
    let provider = Arc::new(MockProvider::new());
    let ada = user(None, None);
    let session = provider.issue_session(&ada);
    let persisted = Arc::new(RecordingTokenStore::default());
    persisted.save(&SessionTokens::from(&session));

    let auth = AuthClient::new(provider.clone()).with_token_store(persisted.clone());
    assert_eq!(auth.access_token(), Some(session.access_token));
    assert!(auth.get_user().await.unwrap().is_some());

    auth.sign_out(SignOutScope::Local).await.unwrap();
    assert!(persisted.load().is_none());
}

#[tokio::test]
async fn dropped_subscription_does_not_block_emitters() {
    let provider = Arc::new(MockProvider::new());
    let auth = client(&provider);
    let sub = auth.on_auth_state_change();
    sub.unsubscribe();
    auth.set_session(provider.issue_session(&user(None, None)));
    assert!(auth.get_session().is_some());
}
