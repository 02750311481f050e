//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers and the gatekeeper middleware
//! via the `State` extractor. The provider and the profile store sit behind
//! trait objects so router tests swap in the in-memory fakes from
//! `identity::testing` without a network or a database.

use std::sync::Arc;

use identity::{IdentityProvider, ProfileStore};

use crate::config::ServerConfig;

/// Shared application state. Clone is required by Axum; every field is an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn IdentityProvider>,
    pub profiles: Arc<dyn ProfileStore>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>, profiles: Arc<dyn ProfileStore>, config: ServerConfig) -> Self {
        Self { provider, profiles, config: Arc::new(config) }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
