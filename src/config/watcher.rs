//! Hot reload of a dialer from its configuration file.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::loader::{load_config, ConfigError};
use crate::net::SecureDialer;

/// Reloads `path` into a live [`SecureDialer`] whenever the file changes.
pub struct ConfigWatcher {
    path: PathBuf,
    dialer: SecureDialer,
}

impl ConfigWatcher {
    pub fn new(path: &Path, dialer: SecureDialer) -> Self {
        Self {
            path: path.to_path_buf(),
            dialer,
        }
    }

    /// Load the file and install it if it differs from the dialer's config.
    ///
    /// Returns `Ok(false)` when the file matches what is already installed.
    /// On error the dialer keeps its current configuration.
    pub fn reload(&self) -> Result<bool, ConfigError> {
        let config = load_config(&self.path)?;
        if config == self.dialer.config() {
            return Ok(false);
        }
        self.dialer.reconfigure(config)?;
        Ok(true)
    }

    /// Start watching the file. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    match self.reload() {
                        Ok(true) => tracing::info!(path = ?self.path, "Configuration reloaded"),
                        Ok(false) => tracing::trace!(path = ?self.path, "Configuration unchanged"),
                        Err(e) => tracing::error!(
                            path = ?self.path,
                            error = %e,
                            "Reload failed, keeping current configuration"
                        ),
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}
