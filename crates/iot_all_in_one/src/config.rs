use common::http::{CorsConfig, HttpLoggingConfig, HttpServerConfig};
use common::postgres::PostgresConfig;
use common::rpc::ConductorConfig;
use common::telemetry::{LogFormat, TelemetryConfig};
use config::{Config, ConfigError, Environment};
use iot_api::ApiConfig;
use serde::{Deserialize, Serialize};

/// Where devices are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

/// How the API reaches the conductor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConductorTransport {
    /// Request/reply over NATS, served by the conductor RPC process
    Nats,
    /// In-process calls; no NATS connection is made
    Local,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output (json, pretty)
    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    // Storage configuration
    #[serde(default = "default_storage_backend")]
    pub storage_backend: StorageBackend,

    /// PostgreSQL host
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    /// PostgreSQL port
    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    /// PostgreSQL database name
    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    /// PostgreSQL username
    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    /// PostgreSQL password
    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    /// Path to PostgreSQL migrations directory
    #[serde(default = "default_postgres_migrations_dir")]
    pub postgres_migrations_dir: String,

    /// Path to goose binary
    #[serde(default = "default_postgres_goose_binary_path")]
    pub postgres_goose_binary_path: String,

    // NATS configuration
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // Conductor configuration
    #[serde(default = "default_conductor_transport")]
    pub conductor_transport: ConductorTransport,

    /// Subject the conductor listens on
    #[serde(default = "default_conductor_topic")]
    pub conductor_topic: String,

    #[serde(default = "default_conductor_queue_group")]
    pub conductor_queue_group: String,

    /// How long the API waits for a conductor reply, in seconds
    #[serde(default = "default_conductor_rpc_timeout_secs")]
    pub conductor_rpc_timeout_secs: u64,

    // API configuration
    #[serde(default = "default_api_host")]
    pub api_host: String,

    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Base URL used in links; the request Host header when empty
    #[serde(default)]
    pub api_public_url: String,

    /// Upper bound for `limit` on list requests
    #[serde(default = "default_api_max_limit")]
    pub api_max_limit: usize,

    #[serde(default)]
    pub api_auth_enabled: bool,

    /// CORS allowed origins (comma-separated list, "*" for all origins,
    /// empty to disable CORS)
    #[serde(default)]
    pub api_cors_allowed_origins: String,

    /// Paths to ignore in request logging (comma-separated)
    #[serde(default = "default_api_ignored_paths")]
    pub api_ignored_paths: String,

    /// Time allowed for cleanup after shutdown, in seconds
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "iot-all-in-one".to_string()
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Postgres
}

// PostgreSQL defaults
fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "iot".to_string()
}

fn default_postgres_username() -> String {
    "iot".to_string()
}

fn default_postgres_password() -> String {
    "iot".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    10
}

fn default_postgres_migrations_dir() -> String {
    "/home/iot/migrations/postgres".to_string()
}

fn default_postgres_goose_binary_path() -> String {
    "goose".to_string()
}

// NATS defaults
fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_startup_timeout_secs() -> u64 {
    30
}

// Conductor defaults
fn default_conductor_transport() -> ConductorTransport {
    ConductorTransport::Nats
}

fn default_conductor_topic() -> String {
    ConductorConfig::default().topic
}

fn default_conductor_queue_group() -> String {
    ConductorConfig::default().queue_group
}

fn default_conductor_rpc_timeout_secs() -> u64 {
    ConductorConfig::default().rpc_timeout_secs
}

// API defaults
fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    6385
}

fn default_api_max_limit() -> usize {
    iot_api::DEFAULT_MAX_LIMIT
}

fn default_api_ignored_paths() -> String {
    "/".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("IOT"))
            .build()?
            .try_deserialize()
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.service_name.clone(),
            log_level: self.log_level.clone(),
            log_format: self.log_format,
        }
    }

    pub fn postgres_config(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.postgres_host.clone(),
            port: self.postgres_port,
            database: self.postgres_database.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            max_pool_size: self.postgres_max_pool_size,
            migrations_dir: self.postgres_migrations_dir.clone(),
            goose_binary_path: self.postgres_goose_binary_path.clone(),
        }
    }

    pub fn conductor_config(&self) -> ConductorConfig {
        ConductorConfig {
            topic: self.conductor_topic.clone(),
            queue_group: self.conductor_queue_group.clone(),
            rpc_timeout_secs: self.conductor_rpc_timeout_secs,
        }
    }

    pub fn api_config(&self) -> ApiConfig {
        let cors_config = if self.api_cors_allowed_origins.trim().is_empty() {
            None
        } else {
            Some(CorsConfig::from_comma_separated(
                &self.api_cors_allowed_origins,
            ))
        };

        ApiConfig {
            http: HttpServerConfig {
                host: self.api_host.clone(),
                port: self.api_port,
                logging_config: HttpLoggingConfig::new(split_list(&self.api_ignored_paths)),
                cors_config,
            },
            public_url: Some(self.api_public_url.clone()).filter(|url| !url.is_empty()),
            max_limit: self.api_max_limit,
            auth_enabled: self.api_auth_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests touching the process environment must not run concurrently
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "IOT_LOG_LEVEL",
        "IOT_STORAGE_BACKEND",
        "IOT_CONDUCTOR_TRANSPORT",
        "IOT_API_PORT",
        "IOT_API_PUBLIC_URL",
        "IOT_API_CORS_ALLOWED_ORIGINS",
        "IOT_API_AUTH_ENABLED",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.storage_backend, StorageBackend::Postgres);
        assert_eq!(config.conductor_transport, ConductorTransport::Nats);
        assert_eq!(config.api_port, 6385);

        let api = config.api_config();
        assert!(api.public_url.is_none());
        assert!(api.http.cors_config.is_none());
        assert!(!api.auth_enabled);
        assert_eq!(api.max_limit, 1000);
        assert_eq!(config.conductor_config(), ConductorConfig::default());
    }

    #[test]
    fn test_custom_config() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        std::env::set_var("IOT_LOG_LEVEL", "debug");
        std::env::set_var("IOT_STORAGE_BACKEND", "memory");
        std::env::set_var("IOT_CONDUCTOR_TRANSPORT", "local");
        std::env::set_var("IOT_API_PORT", "8080");
        std::env::set_var("IOT_API_PUBLIC_URL", "https://iot.example.com");
        std::env::set_var("IOT_API_CORS_ALLOWED_ORIGINS", "https://a.example.com, https://b.example.com");
        std::env::set_var("IOT_API_AUTH_ENABLED", "true");

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.conductor_transport, ConductorTransport::Local);

        let api = config.api_config();
        assert_eq!(api.http.port, 8080);
        assert_eq!(api.public_url.as_deref(), Some("https://iot.example.com"));
        assert!(api.auth_enabled);
        assert_eq!(api.http.cors_config.unwrap().allowed_origins.len(), 2);

        clear_env();
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_env();

        std::env::set_var("IOT_STORAGE_BACKEND", "sqlite");
        assert!(ServiceConfig::from_env().is_err());

        clear_env();
    }
}
