//! Reactive client state.

pub mod auth;
pub mod session;
