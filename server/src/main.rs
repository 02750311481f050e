mod config;
mod db;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use identity::HttpIdentityProvider;
use tracing_subscriber::EnvFilter;

use crate::services::profile::PgProfileStore;

#[tokio::main]
async fn main() {
    // Missing `.env` is fine; real deployments set the environment directly.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,server=debug")))
        .init();

    let config = config::ServerConfig::from_env().expect("invalid server configuration");

    let pool = db::connect_and_migrate(&config.database_url, config.db_max_connections)
        .await
        .expect("database init failed");

    let provider = HttpIdentityProvider::new(config.provider.clone()).expect("identity provider client init failed");
    tracing::info!(base_url = %config.provider.base_url, "identity provider configured");

    let port = config.port;
    let state = state::AppState::new(Arc::new(provider), Arc::new(PgProfileStore::new(pool)), config);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "orbit listening");
    axum::serve(listener, app).await.expect("server failed");
}
