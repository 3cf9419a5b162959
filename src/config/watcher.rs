//! Live reload of the runtime switches.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use crate::config::loader::load_config;
use crate::config::schema::{RuntimeSwitches, ServerConfig};

/// Reloads the config file when it changes on disk.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ServerConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the channel reloaded configs arrive on.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ServerConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. Updates stop when the returned handle is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(error = %e, "Config watch error");
                        return;
                    }
                };
                if !(event.kind.is_modify() || event.kind.is_create()) {
                    return;
                }
                match load_config(&path) {
                    Ok(config) => {
                        tracing::info!(path = %path.display(), "Config file changed");
                        let _ = tx.send(config);
                    }
                    Err(e) => tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Config reload rejected, keeping current settings"
                    ),
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %self.path.display(), "Watching config file");
        Ok(watcher)
    }
}

/// Apply reloaded configs to the live switches until shutdown.
///
/// Only [`RuntimeSwitches`] change; listener addresses and storage settings
/// need a restart.
pub async fn apply_updates(
    mut updates: mpsc::UnboundedReceiver<ServerConfig>,
    switches: Arc<ArcSwap<RuntimeSwitches>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                let next = config.runtime_switches();
                if **switches.load() == next {
                    continue;
                }
                tracing::info!(
                    force_upgrade = next.force_upgrade,
                    lookup_limit_enabled = next.limits.lookup_limit_enabled,
                    lookups_limit = next.limits.unregistered_lookups_limit,
                    daily_limit = next.limits.unregistered_lookups_daily_limit,
                    "Runtime switches updated"
                );
                switches.store(Arc::new(next));
            }
            _ = shutdown.recv() => break,
        }
    }
}
