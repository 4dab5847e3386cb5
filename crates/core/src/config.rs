//! Layered configuration for the ordercore platform.
//!
//! Configuration is loaded in layers with increasing priority:
//! 1. Compiled-in defaults (in-memory store, four workers, 10 s settlement)
//! 2. TOML configuration file (if provided)
//! 3. Environment variable overrides (prefix `ORDERCORE_`, nested with `__`)

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

// ── Default value functions ────────────────────────────────────────────

/// Default HTTP port: 8080.
fn default_port() -> u16 {
    8080
}

/// Default workflow worker count: 4.
fn default_workers() -> usize {
    4
}

/// Default maximum retries for transient store failures: 5.
fn default_max_retries() -> u32 {
    5
}

/// Default initial retry backoff: 50 ms.
fn default_initial_backoff_ms() -> u64 {
    50
}

/// Default maximum retry backoff: 2 000 ms.
fn default_max_backoff_ms() -> u64 {
    2_000
}

/// Default overall per-order workflow deadline: 30 000 ms.
fn default_workflow_deadline_ms() -> u64 {
    30_000
}

/// Default settlement delay: 10 000 ms (simulated T+2).
fn default_settlement_delay_ms() -> u64 {
    10_000
}

/// Default store lock acquisition timeout: 1 000 ms.
fn default_lock_timeout_ms() -> u64 {
    1_000
}

// ── Configuration structs ──────────────────────────────────────────────

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Order engine settings.
    pub engine: EngineConfig,
    /// Settlement scheduler settings.
    pub settlement: SettlementConfig,
    /// Store settings.
    pub store: StoreConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Port to bind the REST/SSE listener on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Order engine configuration: worker pool size and retry policy for
/// transient store failures.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Number of workflow worker threads.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Maximum retry attempts per workflow step.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Initial retry backoff in milliseconds (doubles per attempt).
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Maximum retry backoff in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Overall deadline for driving a single order's workflow, in
    /// milliseconds. Exceeding it rejects the order with a timeout.
    #[serde(default = "default_workflow_deadline_ms")]
    pub workflow_deadline_ms: u64,
}

/// Settlement scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SettlementConfig {
    /// Delay between fill and settlement, in milliseconds. Simulates T+2;
    /// the default is a demonstration value.
    #[serde(default = "default_settlement_delay_ms")]
    pub delay_ms: u64,
}

/// Store configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoreConfig {
    /// Path to the append-only journal file. `None` runs fully in memory
    /// (state is lost on restart).
    #[serde(default)]
    pub journal_path: Option<PathBuf>,
    /// Path to a JSON seed file with investors and assets to load at
    /// startup.
    #[serde(default)]
    pub seed_path: Option<PathBuf>,
    /// How long a transaction waits for the store lock before failing
    /// with a transient error, in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Emit JSON logs (production) instead of pretty logs (development).
    #[serde(default)]
    pub json: bool,
}

impl AppConfig {
    /// Load configuration using layered sources.
    ///
    /// 1. Compiled-in defaults.
    /// 2. TOML file at `config_path` (if `Some`).
    /// 3. Environment variable overrides with prefix `ORDERCORE_` and `__`
    ///    as the nesting separator (e.g., `ORDERCORE_ENGINE__WORKERS=8`).
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder()
            // ── Layer 1: compiled-in defaults ───────────────────────
            .set_default("server.port", 8080i64)?
            .set_default("engine.workers", 4i64)?
            .set_default("engine.max_retries", 5i64)?
            .set_default("engine.initial_backoff_ms", 50i64)?
            .set_default("engine.max_backoff_ms", 2000i64)?
            .set_default("engine.workflow_deadline_ms", 30000i64)?
            .set_default("settlement.delay_ms", 10000i64)?
            .set_default("store.lock_timeout_ms", 1000i64)?
            .set_default("logging.json", false)?;

        // ── Layer 2: TOML file ─────────────────────────────────────
        if let Some(path) = config_path {
            let path_str = path
                .to_str()
                .context("config path is not valid UTF-8")?;
            builder = builder.add_source(File::with_name(path_str).required(true));
        }

        // ── Layer 3: env var overrides (ORDERCORE_ prefix) ─────────
        // The prefix separator must be set explicitly to `_` because the
        // `config` crate defaults it to the nesting separator when one is
        // provided.
        builder = builder.add_source(
            Environment::with_prefix("ORDERCORE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: AppConfig = builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate configuration invariants.
    fn validate(&self) -> Result<()> {
        if self.engine.workers == 0 {
            bail!("engine.workers must be at least 1");
        }
        if self.engine.initial_backoff_ms > self.engine.max_backoff_ms {
            bail!("engine.initial_backoff_ms must not exceed engine.max_backoff_ms");
        }
        if self.store.lock_timeout_ms == 0 {
            bail!("store.lock_timeout_ms must be positive");
        }
        Ok(())
    }
}
