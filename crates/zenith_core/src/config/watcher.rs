//! Reloads module documents when their files change on disk

use super::ConfigRegistry;
use crate::error::{ConfigError, ConfigResult};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Quiet period after the last event for a file before it is reloaded
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

/// Watches the registry's root directory and reloads the one module whose
/// file changed, once events for that file have been quiet for the debounce
/// window. Dropping the watcher stops it.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl ConfigWatcher {
    /// Starts watching with [`DEFAULT_DEBOUNCE`]. Must be called inside a
    /// Tokio runtime.
    pub fn start(registry: ConfigRegistry) -> ConfigResult<Self> {
        Self::with_debounce(registry, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(registry: ConfigRegistry, debounce: Duration) -> ConfigResult<Self> {
        let root = registry.root().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| ConfigError::FileWrite(root.clone(), e))?;

        let (tx, rx) = mpsc::unbounded_channel::<PathBuf>();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| match result {
            Ok(event) => {
                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    for path in event.paths {
                        let _ = tx.send(path);
                    }
                }
            }
            Err(e) => warn!("Config watch error: {}", e),
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        let task = tokio::spawn(debounce_loop(registry, rx, debounce));
        info!("👀 Watching {} for config changes", root.display());

        Ok(Self {
            _watcher: watcher,
            task,
        })
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn debounce_loop(registry: ConfigRegistry, mut rx: mpsc::UnboundedReceiver<PathBuf>, debounce: Duration) {
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

    loop {
        let next_due = pending.values().min().copied();
        tokio::select! {
            received = rx.recv() => match received {
                Some(path) => {
                    if path.extension().and_then(|e| e.to_str()) == Some("yaml") {
                        pending.insert(path, Instant::now() + debounce);
                    }
                }
                None => break,
            },
            _ = sleep_until(next_due) => {
                let now = Instant::now();
                let due: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, at)| **at <= now)
                    .map(|(path, _)| path.clone())
                    .collect();
                for path in due {
                    pending.remove(&path);
                    reload(&registry, path).await;
                }
            }
        }
    }
    debug!("Config watcher loop ended");
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

async fn reload(registry: &ConfigRegistry, path: PathBuf) {
    let registry = registry.clone();
    let shown = path.display().to_string();
    match tokio::task::spawn_blocking(move || registry.reload_changed_file(&path)).await {
        Ok(Ok(Some(module))) => debug!("Reloaded {} from {}", module, shown),
        Ok(Ok(None)) => {}
        Ok(Err(e)) => error!("❌ Failed to reload {}: {}", shown, e),
        Err(e) => error!("❌ Reload task for {} failed: {}", shown, e),
    }
}
