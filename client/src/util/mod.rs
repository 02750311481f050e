//! Utility helpers shared across client modules.
//!
//! SYSTEM CONTEXT
//! ==============
//! Utility modules isolate browser concerns (storage, cookies, navigation)
//! behind small seams so the session logic stays testable off the browser.

pub mod auth;
pub mod cache;
pub mod cookies;
pub mod navigate;
