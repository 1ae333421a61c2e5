use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config directory could not be determined")]
    ConfigDirNotFound,

    #[error(
        "config file not found. Looked in:\n\
        - current directory: bucketflow.local.yaml, .bucketflow.local.yaml, bucketflow.yaml, .bucketflow.yaml\n\
        - ./.bucketflow/ directory\n\
        - ~/.config/bucketflow/config.yaml\n\
        Set BUCKETFLOW_CONFIG_PATH to point at a file directly"
    )]
    ConfigFileNotFound,

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
