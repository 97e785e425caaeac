//! API server configuration.

use goalkeep_core::config::AuthConfig;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// Token signing, lifetimes and lockout.
    pub auth: AuthConfig,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable       | Default                               |
    /// |----------------|---------------------------------------|
    /// | `BIND_ADDR`    | `127.0.0.1:3100`                      |
    /// | `DATABASE_URL` | `postgres://localhost:5432/goalkeep`  |
    ///
    /// Credential settings are read by [`AuthConfig::from_env`].
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3100".into()),
            pg_connection_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/goalkeep".into()),
            auth: AuthConfig::from_env(),
        }
    }
}
