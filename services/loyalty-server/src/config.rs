//! Server configuration
//!
//! Layered: built-in defaults, then an optional `--config` file, then
//! `config/default.*` and `config/local.*`, then `LOYALTY__SECTION__KEY`
//! environment variables. CLI flags are applied on top by `main`.

use std::time::Duration;

use loyalty_accrual::{AccrualConfig, ReconciliationConfig};
use loyalty_api::ApiConfig;
use loyalty_auth::AuthConfig;
use loyalty_db::{DatabaseConfig, StorageConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSettings,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub accrual: AccrualConfig,
    pub reconciliation: ReconciliationConfig,
    pub auth: AuthConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// `host:port` the HTTP API binds to
    pub address: String,
    /// How long to wait for the agent to stop after the HTTP server drained
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
            shutdown_timeout_secs: 10,
        }
    }
}

impl ServerSettings {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error
    pub level: String,
    /// json or pretty
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Prometheus exporter on its own port
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

impl ServerConfig {
    /// Load every layer below the CLI flags
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        builder = builder
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("LOYALTY")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("storage.retry_delays_ms")
                    .with_list_parse_key("api.cors_origins")
                    .try_parsing(true),
            );

        Ok(builder.build()?.try_deserialize()?)
    }
}
