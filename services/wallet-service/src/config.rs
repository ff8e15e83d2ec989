use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub shutdown_timeout_secs: u64,
    /// Time allowed for a client to send the request head
    pub client_request_timeout_secs: u64,
    /// Time allowed for a client to acknowledge connection shutdown
    pub client_disconnect_timeout_secs: u64,
    pub keep_alive_secs: u64,
}

impl ServerConfig {
    pub fn client_request_timeout(&self) -> Duration {
        Duration::from_secs(self.client_request_timeout_secs)
    }

    pub fn client_disconnect_timeout(&self) -> Duration {
        Duration::from_secs(self.client_disconnect_timeout_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub run_migrations: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// `postgres` or `memory`
    pub backend: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            // Start with default configuration
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", 4)?
            .set_default("server.shutdown_timeout_secs", 10)?
            .set_default("server.client_request_timeout_secs", 5)?
            .set_default("server.client_disconnect_timeout_secs", 10)?
            .set_default("server.keep_alive_secs", 60)?
            .set_default("database.url", postgres_url_from_parts())?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 5)?
            .set_default("database.run_migrations", true)?
            .set_default("storage.backend", "postgres")?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?;

        // Add environment-specific config file if it exists
        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        } else {
            builder = builder.add_source(
                File::with_name(&format!("config/{}", environment)).required(false),
            );
        }

        // Override with environment variables
        builder = builder.add_source(Environment::with_prefix("WALLET_SERVICE").separator("__"));

        // Special handling for common env vars
        if let Ok(db_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", db_url)?;
        }

        if let Ok(port) = env::var("APP_PORT") {
            let port = parse_app_port(&port).ok_or_else(|| {
                ConfigError::Message(format!("APP_PORT is not a valid port: {}", port))
            })?;
            builder = builder.set_override("server.port", i64::from(port))?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn storage_backend(&self) -> Result<StorageBackend, String> {
        match self.storage.backend.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" | "in-memory" => Ok(StorageBackend::Memory),
            other => Err(format!("Unknown storage backend: {}", other)),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.server.workers == 0 {
            return Err("At least one server worker is required".to_string());
        }

        // Zero would disable the timeout and let idle clients hold connections.
        if self.server.client_request_timeout_secs == 0 {
            return Err("Server client_request_timeout_secs cannot be 0".to_string());
        }

        let backend = self.storage_backend()?;

        if backend == StorageBackend::Postgres {
            if self.database.url.is_empty() {
                return Err("Database URL is required".to_string());
            }

            if self.database.max_connections == 0 {
                return Err("Database max_connections cannot be 0".to_string());
            }

            if self.database.min_connections > self.database.max_connections {
                return Err("Database min_connections exceeds max_connections".to_string());
            }
        }

        Ok(())
    }
}

/// Builds a connection URL from the `POSTGRES_*` variables.
fn postgres_url_from_parts() -> String {
    let var = |name: &str, default: &str| env::var(name).unwrap_or_else(|_| default.to_string());

    format!(
        "postgres://{}:{}@{}:{}/{}?sslmode=disable",
        var("POSTGRES_USER", "postgres"),
        var("POSTGRES_PASSWORD", ""),
        var("POSTGRES_HOST", "localhost"),
        var("POSTGRES_PORT", "5432"),
        var("POSTGRES_DB", "wallets"),
    )
}

/// Accepts both `8080` and the listen-address form `:8080`.
fn parse_app_port(raw: &str) -> Option<u16> {
    raw.trim().trim_start_matches(':').parse().ok()
}
