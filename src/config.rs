//! Connection configuration.

use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;

/// PostgreSQL connection settings for the message store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Role to connect as.
    pub user: String,
    /// Password, empty for trust/peer authentication.
    pub password: String,
    /// Database name.
    pub dbname: String,
    /// Upper bound on pooled connections.
    pub max_connections: usize,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "message_store".to_string(),
            password: "".to_string(),
            dbname: "message_store".to_string(),
            max_connections: 100,
        }
    }
}

impl PostgresConfig {
    pub(crate) fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.dbname)
    }
}
