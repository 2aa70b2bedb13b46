//! Hot reload of the API key set.
//!
//! The parent directory is watched rather than the file itself: editors that
//! save by writing a temp file and renaming it over the original replace the
//! inode, which a file-level watch would silently lose. Reloads that leave the
//! key set unchanged are dropped here, so the server only hears about
//! rotations.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;

/// Watches the config file and forwards configs whose key set changed.
pub struct ConfigWatcher {
    path: PathBuf,
    reloader: KeyReloader,
}

impl ConfigWatcher {
    /// `current` is the configuration the server started with.
    pub fn new(
        path: &Path,
        current: &GatewayConfig,
    ) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let reloader = KeyReloader {
            path: path.to_path_buf(),
            last_keys: key_set(current),
            update_tx,
        };

        (
            Self {
                path: path.to_path_buf(),
                reloader,
            },
            update_rx,
        )
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let mut reloader = self.reloader;

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) if touches(&event, file_name.as_ref()) => reloader.reload(),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Config watch error"),
            }
        })?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %self.path.display(), "Watching config for API key changes");
        Ok(watcher)
    }
}

/// Whether a directory event concerns the config file.
fn touches(event: &Event, file_name: Option<&OsString>) -> bool {
    let relevant_kind = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
    );
    relevant_kind
        && event
            .paths
            .iter()
            .any(|p| p.file_name().map(|n| n.to_os_string()).as_ref() == file_name)
}

fn key_set(config: &GatewayConfig) -> BTreeSet<String> {
    config.auth.api_keys.iter().cloned().collect()
}

/// Loads the file and emits it when the key set differs from the last one sent.
struct KeyReloader {
    path: PathBuf,
    last_keys: BTreeSet<String>,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl KeyReloader {
    fn reload(&mut self) {
        let config = match load_config(&self.path) {
            Ok(config) => config,
            Err(e) => {
                // Half-written files land here too; the next event retries.
                tracing::warn!(error = %e, "Config reload rejected; keeping current keys");
                return;
            }
        };

        let keys = key_set(&config);
        if keys == self.last_keys {
            tracing::debug!("Config changed but API keys did not");
            return;
        }

        tracing::info!(
            added = keys.difference(&self.last_keys).count(),
            removed = self.last_keys.difference(&keys).count(),
            "API key rotation detected"
        );
        self.last_keys = keys;
        let _ = self.update_tx.send(config);
    }
}
