//! ordercore service binary.
//!
//! Entry point for the order management service. Loads configuration,
//! initializes tracing, and starts the [`App`].

use std::path::PathBuf;

use clap::Parser;

use oc_core::config::AppConfig;
use oc_service::app::App;

/// ordercore order management service
#[derive(Parser, Debug)]
#[command(name = "oc-service", about = "ordercore order management service")]
struct Args {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AppConfig::load(args.config)?;

    oc_core::logging::init_tracing(config.logging.json);

    tracing::info!(
        port = config.server.port,
        workers = config.engine.workers,
        journal = ?config.store.journal_path,
        "starting oc-service"
    );

    App::new(config).run().await
}
