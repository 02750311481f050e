//! Postgres-backed profile store.
//!
//! The `profiles.id` primary key is what makes provisioning idempotent: a
//! second insert for the same user hits `ON CONFLICT DO NOTHING`, affects no
//! rows and is reported as [`InsertOutcome::AlreadyExists`].

use identity::{InsertOutcome, NewProfile, Profile, ProfileError, ProfileStore};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn storage_error(err: sqlx::Error) -> ProfileError {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            ProfileError::Transport(err.to_string())
        }
        other => ProfileError::Storage(other.to_string()),
    }
}

#[async_trait::async_trait]
impl ProfileStore for PgProfileStore {
    async fn find(&self, id: Uuid) -> Result<Option<Profile>, ProfileError> {
        let row = sqlx::query("SELECT id, username, avatar_url, bio, verified FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(row.map(|r| Profile {
            id: r.get("id"),
            username: r.get("username"),
            avatar_url: r.get("avatar_url"),
            bio: r.get("bio"),
            verified: r.get("verified"),
        }))
    }

    async fn insert(&self, profile: &NewProfile) -> Result<InsertOutcome, ProfileError> {
        let result = sqlx::query(
            r"INSERT INTO profiles (id, username, avatar_url, bio, verified)
              VALUES ($1, $2, $3, $4, $5)
              ON CONFLICT (id) DO NOTHING",
        )
        .bind(profile.id)
        .bind(&profile.username)
        .bind(&profile.avatar_url)
        .bind(&profile.bio)
        .bind(profile.verified)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::AlreadyExists)
        } else {
            Ok(InsertOutcome::Created)
        }
    }
}

#[cfg(test)]
#[path = "profile_test.rs"]
mod tests;
