//! Server configuration parsed from environment variables.
//!
//! SYSTEM CONTEXT
//! ==============
//! `main` loads `.env` (via `dotenvy`) and then calls [`ServerConfig::from_env`].
//! Parsing goes through a lookup closure so tests can feed a map instead of
//! mutating the process environment.

use std::path::PathBuf;

use identity::{ProviderConfig, ProviderConfigError, RouteTable, UnlistedPolicy};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_COOKIE_PREFIX: &str = "orbit";
/// Refresh-token cookie lifetime: 400 days, the longest browsers honour.
pub const DEFAULT_REFRESH_MAX_AGE_SECS: i64 = 400 * 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {var}")]
    Missing { var: &'static str },
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
    #[error(transparent)]
    Provider(#[from] ProviderConfigError),
}

/// Session cookie settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieConfig {
    /// Prefix for `<prefix>-access-token`, `<prefix>-refresh-token`,
    /// `<prefix>-code-verifier`.
    pub prefix: String,
    pub secure: bool,
    pub refresh_max_age_secs: i64,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_COOKIE_PREFIX.to_owned(),
            secure: false,
            refresh_max_age_secs: DEFAULT_REFRESH_MAX_AGE_SECS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub provider: ProviderConfig,
    pub routes: RouteTable,
    pub cookies: CookieConfig,
    /// Directory of the built front-end, served for every non-API path.
    pub site_dir: PathBuf,
}

/// Parse a boolean flag (`1/true/yes/on`, `0/false/no/off`).
pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Split a comma-separated path list, dropping blanks.
pub(crate) fn parse_path_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_owned)
        .collect()
}

impl ServerConfig {
    /// Build typed server config from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build typed server config from `lookup`.
    ///
    /// Required:
    /// - `DATABASE_URL`
    /// - `IDENTITY_URL`, `IDENTITY_ANON_KEY`
    ///
    /// Optional:
    /// - `PORT`: default 3000
    /// - `DB_MAX_CONNECTIONS`: default 5
    /// - `SITE_DIR`: default `./site`
    /// - `SESSION_COOKIE_PREFIX`: default `orbit`
    /// - `COOKIE_SECURE`: default inferred from `SITE_URL` being `https://`
    /// - `REFRESH_COOKIE_MAX_AGE_SECS`: default 400 days
    /// - `LANDING_PATH` (`/`), `LOGIN_PATH` (`/login`), `DEFAULT_NEXT_PATH` (`/feed`)
    /// - `PUBLIC_PATHS`, `AUTH_FLOW_PATHS`, `PROTECTED_PATHS`: comma-separated prefixes
    /// - `UNLISTED_PATHS`: `protect` (default) or `allow`
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing { var: "DATABASE_URL" })?;
        let provider = ProviderConfig::from_lookup(&lookup)?;

        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid { var: "PORT", value: raw })?,
            None => DEFAULT_PORT,
        };

        let db_max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::Invalid { var: "DB_MAX_CONNECTIONS", value: raw })?,
            None => DEFAULT_DB_MAX_CONNECTIONS,
        };

        let secure = match lookup("COOKIE_SECURE") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid { var: "COOKIE_SECURE", value: raw })?,
            None => lookup("SITE_URL").is_some_and(|url| url.starts_with("https://")),
        };
        let refresh_max_age_secs = match lookup("REFRESH_COOKIE_MAX_AGE_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::Invalid { var: "REFRESH_COOKIE_MAX_AGE_SECS", value: raw })?,
            None => DEFAULT_REFRESH_MAX_AGE_SECS,
        };
        let cookies = CookieConfig {
            prefix: lookup("SESSION_COOKIE_PREFIX").unwrap_or_else(|| DEFAULT_COOKIE_PREFIX.to_owned()),
            secure,
            refresh_max_age_secs,
        };

        let mut routes = RouteTable::default();
        if let Some(path) = lookup("LANDING_PATH") {
            routes.landing = path;
        }
        if let Some(path) = lookup("LOGIN_PATH") {
            routes.login = path;
        }
        if let Some(path) = lookup("DEFAULT_NEXT_PATH") {
            routes.default_next = path;
        }
        if let Some(raw) = lookup("PUBLIC_PATHS") {
            routes.public = parse_path_list(&raw);
        }
        if let Some(raw) = lookup("AUTH_FLOW_PATHS") {
            routes.auth_flow = parse_path_list(&raw);
        }
        if let Some(raw) = lookup("PROTECTED_PATHS") {
            routes.protected = parse_path_list(&raw);
        }
        if let Some(raw) = lookup("UNLISTED_PATHS") {
            routes.unlisted =
                UnlistedPolicy::parse(&raw).ok_or(ConfigError::Invalid { var: "UNLISTED_PATHS", value: raw })?;
        }

        let site_dir = lookup("SITE_DIR").map_or_else(|| PathBuf::from("site"), PathBuf::from);

        Ok(Self { port, database_url, db_max_connections, provider, routes, cookies, site_dir })
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
