use std::path::PathBuf;

/// Errors surfaced by the sync engine.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("sync service is already running")]
    AlreadyRunning,

    #[error("sync service has already been stopped")]
    Finished,

    #[error("local root {0} is not a directory")]
    InvalidRoot(PathBuf),

    #[error("filesystem watch setup failed: {0}")]
    Watch(#[from] notify::Error),

    #[error("{path} is outside local root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("remote session is not connected")]
    Disconnected,

    #[error("upload of {path} failed after {attempts} attempts: {source}")]
    UploadExhausted {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
}

/// Errors raised while loading or validating the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} must not be empty")]
    Missing(&'static str),

    #[error("either ssh.password or ssh.private_key_path must be set")]
    NoCredentials,
}
