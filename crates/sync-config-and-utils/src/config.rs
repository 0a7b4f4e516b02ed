//! Configuration management for syncd.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default worker poll interval.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// Default number of queue rows claimed per worker tick.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Background worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Milliseconds between poll ticks.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum rows claimed per tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// An HTTP destination registered at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationEndpoint {
    /// Destination name as used in queue rows and records.
    pub name: String,
    /// Base URL of the destination's ingest API.
    pub endpoint: String,
    /// Fallback bearer token when the owner's configuration carries none.
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl DestinationEndpoint {
    /// Parse the endpoint URL.
    pub fn url(&self) -> CoreResult<Url> {
        Url::parse(&self.endpoint).map_err(CoreError::from)
    }
}

/// Main syncd configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Database file override. Defaults to `Paths::database_file()`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Background worker settings.
    #[serde(default)]
    pub worker: WorkerSettings,
    /// Hex-encoded 32-byte key sealing destination credentials.
    #[serde(default)]
    pub credential_key: Option<String>,
    /// HTTP destinations to register.
    #[serde(default)]
    pub destinations: Vec<DestinationEndpoint>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            database_path: None,
            worker: WorkerSettings::default(),
            credential_key: None,
            destinations: Vec::new(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("SYNCD_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Ok(path) = std::env::var("SYNCD_DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(ms) = env_parse::<u64>("SYNCD_POLL_INTERVAL_MS") {
            self.worker.poll_interval_ms = ms;
        }
        if let Some(size) = env_parse::<usize>("SYNCD_BATCH_SIZE") {
            self.worker.batch_size = size;
        }
        if let Ok(key) = std::env::var("SYNCD_CREDENTIAL_KEY") {
            self.credential_key = Some(key);
        }
    }

    /// Check values that would otherwise fail later at runtime.
    pub fn validate(&self) -> CoreResult<()> {
        if self.worker.batch_size == 0 {
            return Err(CoreError::Config("worker.batch_size must be positive".into()));
        }
        if self.worker.poll_interval_ms == 0 {
            return Err(CoreError::Config(
                "worker.poll_interval_ms must be positive".into(),
            ));
        }
        for destination in &self.destinations {
            destination.url()?;
        }
        self.credential_key()?;
        Ok(())
    }

    /// Resolve the database path, preferring the configured override.
    pub fn database_path(&self, paths: &Paths) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| paths.database_file())
    }

    /// Decode the credential sealing key, if configured.
    pub fn credential_key(&self) -> CoreResult<Option<[u8; 32]>> {
        let Some(raw) = self.credential_key.as_deref() else {
            return Ok(None);
        };
        let bytes = hex::decode(raw.trim())
            .map_err(|e| CoreError::Config(format!("credential_key is not hex: {}", e)))?;
        let key: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            CoreError::Config(format!(
                "credential_key must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Some(key))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|raw| raw.trim().parse().ok())
}
