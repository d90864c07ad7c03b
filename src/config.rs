//! Application-level configuration loading.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SWAP_CONDUCTOR_CONFIG_PATH";
/// Environment variable that overrides the listen port.
const PORT_ENV: &str = "PORT";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Canonical state snapshot file.
    pub state_path: PathBuf,
    /// Directory holding per-instance save artifacts.
    pub saves_dir: PathBuf,
    /// Quiet period before a burst of changes is written.
    pub persist_debounce_ms: u64,
    /// Bounded retries for the final rename of a state write.
    pub persist_rename_attempts: u32,
    /// Interval between liveness pings.
    pub ping_interval_secs: u64,
    /// Sessions with no inbound traffic for this long are torn down.
    pub read_timeout_secs: u64,
    /// Per-session outbound queue bound.
    pub outbound_queue_capacity: usize,
    /// How long a correlated command waits for ack/nack.
    pub ack_timeout_secs: u64,
    /// How long a download waits for a pending save.
    pub file_ready_timeout_secs: u64,
    /// Swap delay used when the configured bounds are unset or inverted.
    pub default_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            state_path: PathBuf::from("data/state.json"),
            saves_dir: PathBuf::from("data/saves"),
            persist_debounce_ms: 500,
            persist_rename_attempts: 5,
            ping_interval_secs: 5,
            read_timeout_secs: 60,
            outbound_queue_capacity: 64,
            ack_timeout_secs: 10,
            file_ready_timeout_secs: 30,
            default_interval_secs: 300,
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        if let Some(port) = env::var(PORT_ENV)
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
        {
            config.port = port;
        }
        config
    }

    /// Parse a configuration document; absent fields keep their defaults.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str(contents)
    }

    /// Debounce window for state writes.
    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }

    /// Ping interval, at least one second.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    /// Read deadline, at least one second.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs.max(1))
    }

    /// Ack deadline, at least one second.
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs.max(1))
    }

    /// Download readiness deadline; zero fails fast.
    pub fn file_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.file_ready_timeout_secs)
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
