//! Shared identity model and session plumbing for `server` and `client`.
//!
//! This crate owns everything both execution contexts must agree on: how a
//! path is classified, how a redirect target is sanitised, how a profile is
//! derived from provider claims, and the seams (`IdentityProvider`,
//! `ProfileStore`) through which the hosted auth/database provider is reached.

pub mod client;
pub mod clock;
pub mod http;
pub mod model;
pub mod paths;
pub mod profile;
pub mod provider;
pub mod rest;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use client::{AuthClient, AuthSubscription, TokenStore};
pub use http::{HttpIdentityProvider, ProviderConfig, ProviderConfigError};
pub use model::{
    AuthEvent, AuthenticatedUser, NewProfile, Profile, ProviderUser, Session, SessionTokens, UserMetadata,
};
pub use paths::{PathClass, RouteTable, UnlistedPolicy, safe_next_path};
pub use profile::{InsertOutcome, ProfileError, ProfileSeed, ProfileStore, build_authenticated_user, provision_profile};
pub use provider::{IdentityProvider, ProviderError, SignOutScope, SignUpOutcome};
pub use rest::RestProfileStore;
