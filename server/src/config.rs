//! Server configuration loaded from environment variables.

const DEFAULT_PORT: u16 = 5070;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_SESSION_INBOUND_CAPACITY: usize = 64;
const DEFAULT_CONNECTION_OUTBOUND_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// `None` runs against the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// Bounded inbound queue per call, in frames.
    pub session_inbound_capacity: usize,
    /// Bounded outbound queue per websocket connection, in frames.
    pub connection_outbound_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: None,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            session_inbound_capacity: DEFAULT_SESSION_INBOUND_CAPACITY,
            connection_outbound_capacity: DEFAULT_CONNECTION_OUTBOUND_CAPACITY,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            database_url: std::env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()),
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            session_inbound_capacity: env_parse("SESSION_INBOUND_CAPACITY", DEFAULT_SESSION_INBOUND_CAPACITY).max(1),
            connection_outbound_capacity: env_parse("CONNECTION_OUTBOUND_CAPACITY", DEFAULT_CONNECTION_OUTBOUND_CAPACITY)
                .max(1),
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
