//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router serves the auth callback, the verified-session API and
//! the built front-end. The session gatekeeper wraps all of it, static files
//! included, so protected pages are never served to an unverified browser.
//! Client-side routes fall back to `index.html`.

pub mod auth;
pub mod cookies;
pub mod gate;
pub mod session;

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Router, middleware};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let site_dir = &state.config.site_dir;
    let site = ServeDir::new(site_dir)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(site_dir.join("index.html")));

    Router::new()
        .route("/auth/callback", get(auth::callback))
        .route("/api/session", get(session::current_session))
        .route("/healthz", get(healthz))
        .fallback_service(site)
        .layer(middleware::from_fn_with_state(state.clone(), gate::session_gate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
