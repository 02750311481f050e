//! Advisory cache of the last verified user.
//!
//! SYSTEM CONTEXT
//! ==============
//! Read once at boot to paint the previous user while verification is in
//! flight. Never consulted for access decisions. Two keys are kept and always
//! written and removed together: the user JSON and the millisecond timestamp
//! it was cached at. Entries older than the TTL, or half-written, are ignored.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use identity::AuthenticatedUser;

pub const USER_KEY: &str = "orbit.auth.user";
pub const CACHED_AT_KEY: &str = "orbit.auth.cached_at";
/// Five minutes.
pub const DEFAULT_CACHE_TTL_MS: i64 = 5 * 60 * 1000;

/// String key-value storage (browser `localStorage`, or memory in tests).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// `window.localStorage`. Inert outside the browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStorage;

#[cfg(feature = "hydrate")]
fn local_storage() -> Option<web_sys::Storage> {
    web_sys::window().and_then(|w| w.local_storage().ok().flatten())
}

impl KeyValueStore for LocalStorage {
    fn get(&self, key: &str) -> Option<String> {
        #[cfg(feature = "hydrate")]
        {
            local_storage()?.get_item(key).ok().flatten()
        }
        #[cfg(not(feature = "hydrate"))]
        {
            let _ = key;
            None
        }
    }

    fn set(&self, key: &str, value: &str) {
        #[cfg(feature = "hydrate")]
        {
            if let Some(storage) = local_storage() {
                let _ = storage.set_item(key, value);
            }
        }
        #[cfg(not(feature = "hydrate"))]
        {
            let _ = (key, value);
        }
    }

    fn remove(&self, key: &str) {
        #[cfg(feature = "hydrate")]
        {
            if let Some(storage) = local_storage() {
                let _ = storage.remove_item(key);
            }
        }
        #[cfg(not(feature = "hydrate"))]
        {
            let _ = key;
        }
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
    }

    fn remove(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Two-key user cache with a freshness window.
pub struct AdvisoryCache {
    store: Arc<dyn KeyValueStore>,
    ttl_ms: i64,
}

impl AdvisoryCache {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, ttl_ms: i64) -> Self {
        Self { store, ttl_ms }
    }

    /// Cached user if both keys are present, parse, and are younger than the TTL.
    #[must_use]
    pub fn load(&self, now_ms: i64) -> Option<AuthenticatedUser> {
        let raw_user = self.store.get(USER_KEY)?;
        let Some(cached_at) = self
            .store
            .get(CACHED_AT_KEY)
            .and_then(|raw| raw.trim().parse::<i64>().ok())
        else {
            self.clear();
            return None;
        };

        let age = now_ms - cached_at;
        if !(0..=self.ttl_ms).contains(&age) {
            return None;
        }

        match serde_json::from_str(&raw_user) {
            Ok(user) => Some(user),
            Err(e) => {
                log::debug!("discarding unreadable auth cache entry: {e}");
                self.clear();
                None
            }
        }
    }

    pub fn save(&self, user: &AuthenticatedUser, now_ms: i64) {
        let Ok(raw) = serde_json::to_string(user) else {
            return;
        };
        self.store.set(USER_KEY, &raw);
        self.store.set(CACHED_AT_KEY, &now_ms.to_string());
    }

    pub fn clear(&self) {
        self.store.remove(USER_KEY);
        self.store.remove(CACHED_AT_KEY);
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod cache_test;
