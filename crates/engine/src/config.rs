// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler configuration: TOML on disk, with environment-variable
//! overrides resolved the way the rest of this stack resolves state
//! directories and timeouts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, source: toml::de::Error },
    #[error("failed to serialize config for {path}: {source}")]
    Serialize { path: String, source: toml::ser::Error },
    #[error("failed to write config file {path}: {source}")]
    Write { path: String, source: std::io::Error },
}

/// A single parallel-job environment: a logical name (e.g. `"mpi"`) mapped
/// to the cluster-specific configuration name, plus the DRMAA attribute
/// templates that get `{config_name}`/`{max_node}` substituted in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParallelJobConfig {
    /// logical name -> cluster-specific configuration name
    #[serde(default)]
    pub configurations: HashMap<String, String>,
    /// DRMAA attribute name -> template string
    #[serde(default)]
    pub attribute_templates: HashMap<String, String>,
    /// Environment variable keys forwarded into the parallel job's env vector.
    #[serde(default)]
    pub env_keys: Vec<String>,
}

impl ParallelJobConfig {
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.configurations.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub refresh_interval_ms: u64,
    pub proc_nb: u32,
    pub max_proc_nb: u32,
    pub staging_dir: PathBuf,
    pub parallel_job: ParallelJobConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 1_000,
            proc_nb: num_cpus_or_one(),
            max_proc_nb: 0,
            staging_dir: std::env::temp_dir().join("wfs-staging"),
            parallel_job: ParallelJobConfig::default(),
        }
    }
}

fn num_cpus_or_one() -> u32 {
    std::thread::available_parallelism().map(|n| n.get() as u32).unwrap_or(1)
}

impl SchedulerConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Load a TOML config file, then apply `WFS_*` environment overrides.
    /// `path = None` starts from defaults and applies only the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
                toml::from_str(&text)
                    .map_err(|source| ConfigError::Parse { path: path.display().to_string(), source })?
            }
            None => SchedulerConfig::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("WFS_STAGING_DIR") {
            self.staging_dir = PathBuf::from(dir);
        }
        if let Some(ms) = env_u64("WFS_REFRESH_INTERVAL_MS") {
            self.refresh_interval_ms = ms;
        }
        if let Some(n) = env_u32("WFS_PROC_NB") {
            self.proc_nb = n;
        }
        if let Some(n) = env_u32("WFS_MAX_PROC_NB") {
            self.max_proc_nb = n;
        }
    }

    /// Serialize and write this configuration back to `path`, as a
    /// reconfiguration reload does once it has merged a fresh read.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self)
            .map_err(|source| ConfigError::Serialize { path: path.display().to_string(), source })?;
        std::fs::write(path, text).map_err(|source| ConfigError::Write { path: path.display().to_string(), source })
    }

    /// Start watching `path` for reconfiguration: on Unix, a SIGHUP delivered
    /// to this process re-reads the file; on every platform, calling
    /// [`ConfigReloadHandle::trigger_reload`] does the same (this is what an
    /// explicit CLI reload command should call). Each reload persists the
    /// freshly merged configuration (file contents + environment overrides)
    /// back to `path` and publishes it on the returned watch channel.
    ///
    /// The initial value on the channel is loaded synchronously from `path`
    /// before this function returns, so callers observe a config file error
    /// immediately rather than only on the first reload.
    pub fn watch(path: PathBuf) -> Result<(watch::Receiver<SchedulerConfig>, ConfigReloadHandle), ConfigError> {
        let initial = SchedulerConfig::load(Some(&path))?;
        let (tx, rx) = watch::channel(initial);
        let (trigger_tx, trigger_rx) = mpsc::channel(1);

        tokio::spawn(reload_loop(path, tx, trigger_rx));

        Ok((rx, ConfigReloadHandle { trigger: trigger_tx }))
    }
}

/// Handle to force a reconfiguration reload outside of SIGHUP, e.g. from a
/// CLI `reload` subcommand talking to a long-running process over some other
/// channel, or from a test.
#[derive(Clone)]
pub struct ConfigReloadHandle {
    trigger: mpsc::Sender<()>,
}

impl ConfigReloadHandle {
    pub fn trigger_reload(&self) {
        let _ = self.trigger.try_send(());
    }
}

async fn reload_loop(path: PathBuf, tx: watch::Sender<SchedulerConfig>, mut trigger_rx: mpsc::Receiver<()>) {
    #[cfg(unix)]
    let mut sighup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()).ok();
    #[cfg(not(unix))]
    let sighup: Option<()> = None;

    loop {
        let fired = {
            #[cfg(unix)]
            {
                match &mut sighup {
                    Some(signal) => tokio::select! {
                        _ = signal.recv() => true,
                        msg = trigger_rx.recv() => msg.is_some(),
                    },
                    None => trigger_rx.recv().await.is_some(),
                }
            }
            #[cfg(not(unix))]
            {
                let _ = &sighup;
                trigger_rx.recv().await.is_some()
            }
        };

        if !fired {
            break;
        }

        match SchedulerConfig::load(Some(&path)) {
            Ok(new_config) => {
                if let Err(err) = new_config.save(&path) {
                    tracing::warn!(path = %path.display(), %err, "failed to persist reloaded scheduler configuration");
                }
                tracing::info!(path = %path.display(), "reloaded scheduler configuration");
                if tx.send(new_config).is_err() {
                    break;
                }
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "failed to reload scheduler configuration, keeping previous value");
            }
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
