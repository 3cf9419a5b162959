//! Startup orchestration.
//!
//! # Responsibilities
//! - Load the in-memory stores from the data directory
//! - Pick the starting database of every language
//! - Build the shared session context
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::admin::run_admin_listener;
use crate::config::{RuntimeSwitches, ServerConfig, StorageConfig};
use crate::lifecycle::Shutdown;
use crate::net::{Listener, ListenerError, OpenSessions, Port};
use crate::observability::metrics;
use crate::routing::DatabaseRouter;
use crate::session::{run_client_listener, SessionContext};
use crate::storage::fixtures::{load_databases, load_reg_codes, load_state, save_state};
use crate::storage::memory::{MemoryCatalog, MemoryRequestLog, MemoryUserStore};
use crate::storage::{StorageError, Stores};

/// Operators connecting at once to the admin port.
const ADMIN_CONNECTIONS: usize = 16;

/// Fatal startup failures.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("listener: {0}")]
    Listener(#[from] ListenerError),
}

/// The in-memory backend, with concrete handles kept for seeding and
/// inspection.
#[derive(Debug, Clone)]
pub struct MemoryStores {
    pub catalog: MemoryCatalog,
    pub users: Arc<MemoryUserStore>,
    pub request_log: Arc<MemoryRequestLog>,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self {
            catalog: MemoryCatalog::new(),
            users: Arc::new(MemoryUserStore::new()),
            request_log: Arc::new(MemoryRequestLog::new()),
        }
    }

    /// Trait-object view handed to the server.
    pub fn stores(&self) -> Stores {
        Stores {
            catalog: Arc::new(self.catalog.clone()),
            users: self.users.clone(),
            request_log: self.request_log.clone(),
        }
    }
}

impl Default for MemoryStores {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the in-memory backend, loading `storage.data_dir` if set.
pub fn load_memory_stores(config: &StorageConfig) -> Result<MemoryStores, StorageError> {
    let stores = MemoryStores::new();
    if let Some(dir) = &config.data_dir {
        let databases = load_databases(dir, &stores.catalog)?;
        let codes = load_reg_codes(dir, &stores.users)?;
        let restored = load_state(dir, &stores.users, &stores.request_log)?;
        tracing::info!(
            dir = %dir.display(),
            databases,
            reg_codes = codes,
            restored,
            "Data directory loaded"
        );
    } else {
        tracing::warn!("No storage.data_dir configured, starting without databases");
    }
    Ok(stores)
}

/// Write users and lookup history back to `storage.data_dir`, if set.
pub fn save_memory_stores(config: &StorageConfig, stores: &MemoryStores) -> Result<(), StorageError> {
    match &config.data_dir {
        Some(dir) => save_state(dir, &stores.users, &stores.request_log),
        None => Ok(()),
    }
}

/// A started server.
pub struct RunningServer {
    client_addr: SocketAddr,
    admin_addr: Option<SocketAddr>,
    router: Arc<DatabaseRouter>,
    switches: Arc<ArcSwap<RuntimeSwitches>>,
    shutdown: Shutdown,
    sessions: OpenSessions,
    tasks: Vec<JoinHandle<Result<(), ListenerError>>>,
}

impl RunningServer {
    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_addr
    }

    pub fn router(&self) -> &Arc<DatabaseRouter> {
        &self.router
    }

    /// Live switches, replaced on config reload.
    pub fn switches(&self) -> &Arc<ArcSwap<RuntimeSwitches>> {
        &self.switches
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Wait for a shutdown trigger, then stop.
    pub async fn run_until_stopped(self, drain_timeout: Duration) {
        self.shutdown.wait().await;
        self.shutdown(drain_timeout).await;
    }

    /// Stop accepting, then give open sessions `drain_timeout` to finish.
    pub async fn shutdown(self, drain_timeout: Duration) {
        self.shutdown.trigger();
        for task in self.tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Listener failed"),
                Err(e) => tracing::error!(error = %e, "Listener task panicked"),
            }
        }
        if self.sessions.drained(drain_timeout).await {
            tracing::info!("All connections closed");
        } else {
            tracing::warn!(
                remaining = self.sessions.count(),
                "Drain timed out, dropping connections"
            );
        }
    }
}

/// Start the server on `stores`.
pub async fn start(config: ServerConfig, stores: Stores) -> Result<RunningServer, StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let router = Arc::new(DatabaseRouter::initialize(Arc::clone(&stores.catalog), &config.storage).await?);
    let available = router.snapshot().available_langs();
    if available.is_empty() {
        tracing::warn!("No language has a usable database; every lookup will fail");
    }

    let switches = Arc::new(ArcSwap::from_pointee(config.runtime_switches()));
    let ctx = Arc::new(SessionContext::new(
        config.protocol.clone(),
        Arc::clone(&switches),
        Arc::clone(&router),
        &stores,
    ));

    let shutdown = Shutdown::new();
    let sessions = OpenSessions::new();
    let mut tasks = Vec::new();

    let admin_addr = if config.admin.enabled {
        let listener = Listener::bind(Port::Admin, &config.admin.bind_address, ADMIN_CONNECTIONS).await?;
        let addr = listener.local_addr();
        tasks.push(tokio::spawn(run_admin_listener(
            listener,
            Arc::clone(&router),
            config.protocol.request_timeout(),
            shutdown.subscribe(),
        )));
        Some(addr)
    } else {
        None
    };

    let listener = Listener::bind(
        Port::Client,
        &config.listener.bind_address,
        config.listener.max_connections,
    )
    .await?;
    let client_addr = listener.local_addr();
    tasks.push(tokio::spawn(run_client_listener(
        listener,
        ctx,
        sessions.clone(),
        shutdown.subscribe(),
    )));

    tracing::info!(
        client = %client_addr,
        admin = ?admin_addr,
        langs = ?available,
        "iPedia server started"
    );

    Ok(RunningServer {
        client_addr,
        admin_addr,
        router,
        switches,
        shutdown,
        sessions,
        tasks,
    })
}
