use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Default number of log events between automatic compactions.
const DEFAULT_COMPACT_LOG_ENTRIES: usize = 4096;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per job (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.5 = 500ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 0.5,
            max_delay_secs: 60,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(self.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

/// Global configuration loaded from `~/.config/courier/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierConfig {
    /// Maximum admitted-and-unfinished jobs across all users (G).
    pub max_active_jobs: usize,
    /// Maximum admitted-and-unfinished jobs per user (U).
    pub max_active_per_user: usize,
    /// Maximum admitted submissions per user per rolling window (F).
    pub max_submissions_per_window: usize,
    /// Length of the rolling submission window in seconds.
    pub submission_window_secs: u64,
    /// Worker pool size (W).
    pub workers: usize,
    /// Per-attempt extractor timeout in seconds.
    pub extract_timeout_secs: u64,
    /// Per-attempt delivery timeout in seconds.
    pub deliver_timeout_secs: u64,
    /// Artifact size limit enforced by the delivery gateway, in bytes.
    pub max_artifact_bytes: u64,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Override for the durable state directory (default: XDG state home).
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    /// Override for the temp artifact area (default: `<state>/spool`).
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,
    /// Log events between automatic compactions.
    #[serde(default)]
    pub compact_log_entries: Option<usize>,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            max_active_jobs: 10,
            max_active_per_user: 1,
            max_submissions_per_window: 6,
            submission_window_secs: 60,
            workers: 4,
            extract_timeout_secs: 120,
            deliver_timeout_secs: 120,
            max_artifact_bytes: 2 * 1024 * 1024 * 1024,
            retry: None,
            state_dir: None,
            spool_dir: None,
            compact_log_entries: None,
        }
    }
}

impl CourierConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone().unwrap_or_default().policy()
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs.max(1))
    }

    pub fn deliver_timeout(&self) -> Duration {
        Duration::from_secs(self.deliver_timeout_secs.max(1))
    }

    pub fn submission_window(&self) -> Duration {
        Duration::from_secs(self.submission_window_secs.max(1))
    }

    pub fn compact_log_entries(&self) -> usize {
        self.compact_log_entries
            .unwrap_or(DEFAULT_COMPACT_LOG_ENTRIES)
            .max(1)
    }

    /// Durable state directory (job log, snapshot).
    pub fn state_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("courier")?;
        Ok(xdg_dirs.get_state_home())
    }

    /// Temp artifact area, namespaced per job under it.
    pub fn spool_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.spool_dir {
            return Ok(dir.clone());
        }
        Ok(self.state_dir()?.join("spool"))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("courier")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<CourierConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = CourierConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: CourierConfig = toml::from_str(&data)?;
    Ok(cfg)
}
