use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;
pub const DEFAULT_KEEPALIVE_SECS: u64 = 30;

/// Top level configuration, read once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub local_directory: PathBuf,
    pub remote_directory: String,
    pub ssh: SshConfig,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    pub host: String,
    #[serde(default = "SshConfig::default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
    /// Allowed host key fingerprints (OpenSSH SHA256) or base64 keys.
    #[serde(default)]
    pub fingerprints: Option<Vec<String>>,
}

impl SshConfig {
    fn default_port() -> u16 { 22 }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default)]
    pub delete_remote: bool,
    /// Debounce window in seconds.
    #[serde(default = "SyncSettings::default_sync_interval")]
    pub sync_interval: u64,
    #[serde(default = "SyncSettings::default_retry_max")]
    pub retry_max: u32,
    /// Linear backoff step between upload attempts.
    #[serde(default = "SyncSettings::default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "SyncSettings::default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "SyncSettings::default_keepalive_secs")]
    pub keepalive_secs: u64,
}

impl SyncSettings {
    fn default_sync_interval() -> u64 { DEFAULT_SYNC_INTERVAL_SECS }
    fn default_retry_max() -> u32 { 3 }
    fn default_retry_backoff_ms() -> u64 { 1000 }
    fn default_queue_capacity() -> usize { DEFAULT_QUEUE_CAPACITY }
    fn default_keepalive_secs() -> u64 { DEFAULT_KEEPALIVE_SECS }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            ignore_patterns: Vec::new(),
            delete_remote: false,
            sync_interval: Self::default_sync_interval(),
            retry_max: Self::default_retry_max(),
            retry_backoff_ms: Self::default_retry_backoff_ms(),
            queue_capacity: Self::default_queue_capacity(),
            keepalive_secs: Self::default_keepalive_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "LogConfig::default_level")]
    pub level: String,
    /// Empty string disables the file sink.
    #[serde(default = "LogConfig::default_file")]
    pub file: PathBuf,
    #[serde(default = "LogConfig::default_max_size_mb")]
    pub max_size_mb: u64,
}

impl LogConfig {
    fn default_level() -> String { "info".to_string() }
    fn default_file() -> PathBuf { PathBuf::from("sync.log") }
    fn default_max_size_mb() -> u64 { 10 }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            file: Self::default_file(),
            max_size_mb: Self::default_max_size_mb(),
        }
    }
}

impl SyncConfig {
    /// Load and validate a config file. `.json` is parsed as JSON, anything
    /// else as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        let mut config: SyncConfig = match ext {
            "json" => serde_json::from_str(&text)?,
            _ => serde_yaml::from_str(&text)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: SyncConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject incomplete configs and fill zero values with defaults.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.local_directory.as_os_str().is_empty() {
            return Err(ConfigError::Missing("local_directory"));
        }
        if self.remote_directory.trim().is_empty() {
            return Err(ConfigError::Missing("remote_directory"));
        }
        if self.ssh.host.trim().is_empty() {
            return Err(ConfigError::Missing("ssh.host"));
        }
        if self.ssh.username.trim().is_empty() {
            return Err(ConfigError::Missing("ssh.username"));
        }
        if self.ssh.password.as_deref().is_some_and(str::is_empty) {
            self.ssh.password = None;
        }
        if self
            .ssh
            .private_key_path
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            self.ssh.private_key_path = None;
        }
        if self.ssh.password.is_none() && self.ssh.private_key_path.is_none() {
            return Err(ConfigError::NoCredentials);
        }
        if self.ssh.port == 0 {
            self.ssh.port = SshConfig::default_port();
        }
        if self.sync.sync_interval == 0 {
            self.sync.sync_interval = DEFAULT_SYNC_INTERVAL_SECS;
        }
        if self.sync.retry_max == 0 {
            self.sync.retry_max = SyncSettings::default_retry_max();
        }
        if self.sync.queue_capacity == 0 {
            self.sync.queue_capacity = DEFAULT_QUEUE_CAPACITY;
        }
        if self.sync.keepalive_secs == 0 {
            self.sync.keepalive_secs = DEFAULT_KEEPALIVE_SECS;
        }
        if self.log.level.trim().is_empty() {
            self.log.level = LogConfig::default_level();
        }
        if self.log.max_size_mb == 0 {
            self.log.max_size_mb = LogConfig::default_max_size_mb();
        }
        Ok(())
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_secs(self.sync.sync_interval.max(1))
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.sync.keepalive_secs.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.sync.retry_max.max(1),
            backoff_step: Duration::from_millis(self.sync.retry_backoff_ms),
        }
    }
}
