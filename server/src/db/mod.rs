//! Postgres pool and schema bootstrap.
//!
//! The only table this service owns is `profiles`; migrations run before the
//! listener binds so provisioning never races a missing schema.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Connect to `database_url` and apply pending migrations.
///
/// # Errors
///
/// Returns an error if the connection or migrations fail.
pub async fn connect_and_migrate(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::migrate!("src/db/migrations").run(&pool).await?;
    tracing::info!(max_connections, "database ready");

    Ok(pool)
}
