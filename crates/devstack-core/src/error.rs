use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DevstackError {
    #[error("manifest not found at {0}: run 'devstack init'")]
    ManifestNotFound(PathBuf),

    #[error("invalid env key '{0}': must be non-empty, not start with '#', and contain no '=' or whitespace")]
    InvalidEnvKey(String),

    #[error("invalid value for env key '{0}': values must fit on one line")]
    InvalidEnvValue(String),

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DevstackError>;
