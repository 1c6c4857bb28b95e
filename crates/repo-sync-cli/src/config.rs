use std::path::PathBuf;
use std::time::Duration;

use repo_sync::{Policy, RemoteDescriptor, RetryPolicy, SyncConfig};
use serde::{Deserialize, Serialize};

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub remotes: Vec<RemoteEntry>,
}

/// Engine tunables, as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncSettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub fetch_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        let defaults = SyncConfig::default();
        Self {
            max_attempts: defaults.retry.max_attempts,
            initial_backoff_ms: defaults.retry.initial_backoff.as_millis() as u64,
            max_backoff_ms: defaults.retry.max_backoff.as_millis() as u64,
            fetch_timeout_secs: defaults.fetch_timeout.as_secs(),
        }
    }
}

impl SyncSettings {
    pub fn to_sync_config(&self) -> SyncConfig {
        SyncConfig {
            retry: RetryPolicy::new(
                self.max_attempts,
                Duration::from_millis(self.initial_backoff_ms),
                Duration::from_millis(self.max_backoff_ms),
            ),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
        }
    }
}

/// A named remote.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteEntry {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub policy: Policy,
}

impl RemoteEntry {
    pub fn descriptor(&self) -> RemoteDescriptor {
        RemoteDescriptor::new(&self.name, &self.url).with_policy(self.policy)
    }
}

impl AppConfig {
    pub fn remote(&self, name: &str) -> Option<&RemoteEntry> {
        self.remotes.iter().find(|r| r.name == name)
    }
}

/// Config file path: `~/.config/repo-sync/config.toml`
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("repo-sync").join("config.toml"))
}

/// Load config from file, falling back to defaults if missing or invalid.
pub fn load_config() -> AppConfig {
    if let Some(path) = config_path()
        && let Ok(contents) = std::fs::read_to_string(&path)
    {
        match toml::from_str::<AppConfig>(&contents) {
            Ok(config) => return config,
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to parse config, using defaults"
            ),
        }
    }

    AppConfig::default()
}
