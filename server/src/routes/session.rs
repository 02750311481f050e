//! Verified-session API.

use axum::extract::State;
use axum::response::Json;
use identity::{AuthenticatedUser, build_authenticated_user};

use super::gate::VerifiedUser;
use crate::state::AppState;

/// `GET /api/session`: the gate-verified user joined with their profile.
///
/// Responds `401` through the [`VerifiedUser`] extractor when the gatekeeper
/// found no live session. A profile lookup failure degrades to claim-derived
/// fields rather than failing the request.
pub async fn current_session(State(state): State<AppState>, VerifiedUser(user): VerifiedUser) -> Json<AuthenticatedUser> {
    let profile = match state.profiles.find(user.id).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!(user_id = %user.id, error = %e, "profile lookup failed");
            None
        }
    };
    Json(build_authenticated_user(&user, profile.as_ref()))
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
