//! Daemon configuration.
//!
//! Priority: CLI / env var  >  `{data_dir}/config.toml`  >  built-in default.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::error;

const DEFAULT_PLATFORM: &str = "egestiona";
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_JOB_RETENTION_DAYS: u32 = 30;

/// `{data_dir}/config.toml` — all fields are optional overrides.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// Log level filter string, e.g. "debug", "info,caed=trace" (default: "info").
    log: Option<String>,
    /// Log output format: "pretty" (default) | "json".
    log_format: Option<String>,
    /// Portal platform identifier this deployment targets.
    platform: Option<String>,
    /// Worker idle poll interval in milliseconds (default: 500).
    poll_interval_ms: Option<u64>,
    /// Days to keep terminal jobs before pruning (default: 30; 0 = never).
    job_retention_days: Option<u32>,
    /// Run uploads in dry-run mode (plan everything, upload nothing).
    dry_run: Option<bool>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub data_dir: PathBuf,
    pub log: String,
    /// "pretty" | "json".
    pub log_format: String,
    pub platform: String,
    pub poll_interval_ms: u64,
    /// 0 = keep terminal jobs forever.
    pub job_retention_days: u32,
    pub dry_run: bool,
}

impl DaemonConfig {
    /// Build config from CLI/env args + optional TOML file.
    pub fn new(data_dir: Option<PathBuf>, log: Option<String>) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        let toml = load_toml(&data_dir).unwrap_or_default();

        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let log_format = std::env::var("CAED_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        let platform = std::env::var("CAED_PLATFORM")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.platform)
            .unwrap_or_else(|| DEFAULT_PLATFORM.to_string());

        let poll_interval_ms = toml.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        let job_retention_days = toml
            .job_retention_days
            .unwrap_or(DEFAULT_JOB_RETENTION_DAYS);

        let dry_run = std::env::var("CAED_DRY_RUN")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .or(toml.dry_run)
            .unwrap_or(false);

        Self {
            data_dir,
            log,
            log_format,
            platform,
            poll_interval_ms,
            job_retention_days,
            dry_run,
        }
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("caed");
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("caed");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local").join("share").join("caed");
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("caed");
        }
    }
    PathBuf::from(".caed")
}
