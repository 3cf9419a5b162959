//! iPedia encyclopedia lookup server.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                    IPEDIA SERVER                     │
//!                      │                                                      │
//!   Client request     │  ┌─────────┐    ┌──────────┐    ┌──────────────┐     │
//!   ───────────────────┼─▶│   net   │───▶│ session  │───▶│   identity   │     │
//!                      │  │listener │    │  state   │    │   resolver   │     │
//!                      │  └─────────┘    └────┬─────┘    └──────────────┘     │
//!                      │                      │                               │
//!                      │                      ▼                               │
//!   Client response    │                ┌──────────┐    ┌──────────────┐      │
//!   ◀──────────────────┼────────────────│ handlers │───▶│   routing    │      │
//!                      │                └──────────┘    │ (RouterState)│      │
//!                      │                                └──────▲───────┘      │
//!   Operator           │  ┌─────────┐                          │              │
//!   ───────────────────┼─▶│  admin  │──────────────────────────┘              │
//!                      │  └─────────┘                                         │
//!                      │                                                      │
//!                      │  config · security · storage · observability ·       │
//!                      │  lifecycle                                           │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use ipedia_server::config::watcher::{apply_updates, ConfigWatcher};
use ipedia_server::config::{load_config, ServerConfig};
use ipedia_server::lifecycle::{self, signals};
use ipedia_server::observability::logging;

/// Time open sessions get to finish after shutdown is requested.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "ipedia-server")]
#[command(about = "Encyclopedia lookup server for thin mobile clients", long_about = None)]
struct Args {
    /// Path to the TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of article databases, overriding storage.data_dir.
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Watch the config file and apply runtime switches on change.
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(dir) = args.data_dir {
        config.storage.data_dir = Some(dir);
    }

    logging::init_logging(&config.observability);
    tracing::info!("ipedia-server v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        admin_address = %config.admin.bind_address,
        max_connections = config.listener.max_connections,
        request_timeout_secs = config.protocol.request_timeout_secs,
        "Configuration loaded"
    );

    let storage = config.storage.clone();
    let stores = lifecycle::load_memory_stores(&storage)?;
    let server = lifecycle::start(config, stores.stores()).await?;
    let shutdown = server.shutdown_handle();
    signals::spawn_signal_handler(shutdown.clone());

    // Keep the watcher alive for the life of the server.
    let _watcher = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            let watcher = watcher.run()?;
            tokio::spawn(apply_updates(
                updates,
                std::sync::Arc::clone(server.switches()),
                shutdown.subscribe(),
            ));
            Some(watcher)
        }
        _ => None,
    };

    server.run_until_stopped(DRAIN_TIMEOUT).await;

    if let Err(e) = lifecycle::save_memory_stores(&storage, &stores) {
        tracing::error!(error = %e, "Failed to save server state");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
