//! Loyalty Server
//!
//! Runs the loyalty HTTP API and the background reconciliation agent in one
//! process.
//!
//! # Usage
//!
//! ```bash
//! # Against a local Postgres and accrual authority
//! loyalty-server -a 127.0.0.1:8080 -d postgres://loyalty@localhost/loyalty -r http://127.0.0.1:8081
//!
//! # With a random in-process accrual authority
//! loyalty-server --dev-mode --mock-accrual -d postgres://loyalty@localhost/loyalty
//!
//! # Environment overrides
//! LOYALTY__RECONCILIATION__POLL_INTERVAL_MS=1000 loyalty-server
//! ```

mod config;
mod mock_accrual;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use loyalty_accrual::{spawn_supervised, AccrualClient, AgentHealth, ReconciliationAgent};
use loyalty_api::{create_router, AppState};
use loyalty_db::{Database, PgLedgerStore, Retrying};

use crate::config::{LoggingConfig, MetricsConfig, ServerConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Loyalty points server
#[derive(Parser, Debug)]
#[command(name = "loyalty-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "LOYALTY_CONFIG")]
    config: Option<String>,

    /// HTTP bind address
    #[arg(short = 'a', long, env = "RUN_ADDRESS")]
    address: Option<String>,

    /// PostgreSQL connection string
    #[arg(short = 'd', long, env = "DATABASE_URI")]
    database: Option<String>,

    /// Accrual authority base URL
    #[arg(short = 'r', long, env = "ACCRUAL_SYSTEM_ADDRESS")]
    accrual_address: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "LOG_FORMAT")]
    log_format: Option<String>,

    /// JWT signing secret
    #[arg(long, env = "JWT_SECRET")]
    jwt_secret: Option<String>,

    /// Start an in-process mock accrual authority and use it
    #[arg(long, env = "MOCK_ACCRUAL")]
    mock_accrual: bool,

    /// Enable development mode (relaxed security)
    #[arg(long, env = "LOYALTY_DEV_MODE")]
    dev_mode: bool,
}

impl Args {
    /// CLI flags win over every configuration layer
    fn apply(self, config: &mut ServerConfig) {
        if let Some(address) = self.address {
            config.server.address = address;
        }
        if let Some(url) = self.database {
            config.database.url = url;
        }
        if let Some(url) = self.accrual_address {
            config.accrual.base_url = url;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        if let Some(secret) = self.jwt_secret {
            config.auth.jwt.secret = secret;
        }
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let dev_mode = args.dev_mode;
    let mock_accrual = args.mock_accrual;

    let mut server_config = ServerConfig::load(args.config.as_deref())?;
    args.apply(&mut server_config);

    init_logging(&server_config.logging);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting loyalty server"
    );

    validate_config(&server_config, dev_mode)?;

    if server_config.metrics.enabled {
        start_metrics_exporter(&server_config.metrics)?;
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(forward_shutdown_signal(shutdown.clone()));

    // Storage
    let store = Arc::new(init_store(&server_config).await?);

    // Accrual authority
    if mock_accrual {
        let (base_url, _mock) = mock_accrual::spawn(shutdown.clone()).await?;
        server_config.accrual.base_url = base_url;
    }
    let client = AccrualClient::new(&server_config.accrual)?;
    tracing::info!(base_url = %server_config.accrual.base_url, "Accrual client ready");

    // Reconciliation agent
    let health = Arc::new(AgentHealth::new());
    let agent = Arc::new(ReconciliationAgent::new(
        store.clone(),
        Arc::new(client),
        server_config.reconciliation.clone(),
        health.clone(),
    ));
    let agent_handle = spawn_supervised(agent, shutdown.clone());

    // HTTP API
    let state = Arc::new(AppState::new(
        store.clone(),
        store,
        &server_config.auth,
        health,
    )?);
    let app = create_router(state, &server_config.api);

    let listener = tokio::net::TcpListener::bind(&server_config.server.address).await?;
    tracing::info!(address = %server_config.server.address, "Server listening");

    let drained = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { drained.cancelled().await })
        .await?;

    // The listener may also stop on its own; make sure the agent follows
    shutdown.cancel();
    let timeout = server_config.server.shutdown_timeout();
    if tokio::time::timeout(timeout, agent_handle).await.is_err() {
        tracing::warn!(
            timeout_secs = timeout.as_secs(),
            "Reconciliation agent did not stop in time"
        );
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

// =============================================================================
// Initialization Functions
// =============================================================================

fn init_logging(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            subscriber
                .with(fmt::layer().json().with_target(true))
                .init();
        }
        _ => {
            subscriber
                .with(fmt::layer().pretty().with_target(true))
                .init();
        }
    }
}

fn validate_config(config: &ServerConfig, dev_mode: bool) -> anyhow::Result<()> {
    if config.auth.jwt.uses_dev_secret() {
        if !dev_mode {
            anyhow::bail!(
                "JWT secret must be changed outside dev mode. Set JWT_SECRET or pass --dev-mode."
            );
        }
        tracing::warn!("Using the development JWT secret");
    } else if config.auth.jwt.secret.len() < 32 {
        tracing::warn!("JWT secret is shorter than 32 bytes");
    }

    if config.storage.operation_timeout_ms == 0 {
        anyhow::bail!("storage.operation_timeout_ms must be positive");
    }
    if config.reconciliation.poll_interval_ms == 0 {
        anyhow::bail!("reconciliation.poll_interval_ms must be positive");
    }

    Ok(())
}

/// Connect, migrate and wrap the Postgres store in the retry policy
async fn init_store(config: &ServerConfig) -> anyhow::Result<Retrying<PgLedgerStore>> {
    let db = Database::connect(&config.database).await?;

    if config.database.run_migrations {
        db.migrate().await?;
    }
    if !db.health_check().await {
        anyhow::bail!("Database health check failed");
    }

    tracing::info!(
        retry_delays_ms = ?config.storage.retry_delays_ms,
        operation_timeout_ms = config.storage.operation_timeout_ms,
        "Ledger store ready"
    );
    Ok(Retrying::from_config(db.ledger_store(), &config.storage))
}

/// Install the Prometheus recorder and its HTTP listener
fn start_metrics_exporter(config: &MetricsConfig) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!(port = config.port, "Metrics exporter started");
    Ok(())
}

// =============================================================================
// Graceful Shutdown
// =============================================================================

/// Cancel `shutdown` on Ctrl+C or SIGTERM
async fn forward_shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => tracing::info!("Received SIGTERM, initiating graceful shutdown..."),
        _ = shutdown.cancelled() => return,
    }

    shutdown.cancel();
}

// =============================================================================
// Tests
// =============================================================================
