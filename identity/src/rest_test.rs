use super::*;
use crate::testing::{self, MockProvider};

fn store() -> RestProfileStore {
    RestProfileStore::new(ProviderConfig::new("https://id.example", "anon-key")).unwrap()
}

#[test]
fn bearer_falls_back_to_anon_key() {
    assert_eq!(store().bearer(None), "anon-key");
}

#[test]
fn bearer_uses_held_session() {
    let provider = Arc::new(MockProvider::new());
    let auth = Arc::new(AuthClient::new(provider.clone()));
    auth.set_session(provider.issue_session(&testing::user(Some("ada@example.com"), None)));
    let held = auth.access_token().unwrap();

    assert_eq!(store().with_auth(auth).bearer(None), held);
}

#[test]
fn explicit_token_wins_over_held_session() {
    let provider = Arc::new(MockProvider::new());
    let auth = Arc::new(AuthClient::new(provider.clone()));
    auth.set_session(provider.issue_session(&testing::user(Some("ada@example.com"), None)));
    let held = auth.access_token().unwrap();

    let bearer = store().with_auth(auth).bearer(Some("grace-token"));
    assert_eq!(bearer, "grace-token");
    assert_ne!(bearer, held);
}
