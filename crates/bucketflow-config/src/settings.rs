//! Tool settings loaded from YAML
//!
//! Every field has a default, so an empty file and a missing file behave the
//! same.

use crate::error::{ConfigError, Result};
use crate::{find_config_file, get_config_dir};
use bucketflow_cloud::{CostRates, DEFAULT_STACK_PREFIX, TeardownPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `store.data_dir`
pub const DATA_DIR_ENV: &str = "BUCKETFLOW_DATA_DIR";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub aws: AwsSettings,
    pub cdk: CdkSettings,
    pub teardown: TeardownPolicy,
    pub pricing: CostRates,
    pub store: StoreSettings,

    /// File the settings were read from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsSettings {
    /// aws CLI executable
    pub program: String,
    pub profile: Option<String>,
    pub region: Option<String>,
    /// Per-call timeout
    pub timeout_secs: u64,
}

impl Default for AwsSettings {
    fn default() -> Self {
        Self {
            program: "aws".to_string(),
            profile: None,
            region: None,
            timeout_secs: 60,
        }
    }
}

impl AwsSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CdkSettings {
    /// CDK launcher, split on whitespace (e.g. "npx cdk")
    pub command: String,
    /// Directory holding the CDK app; defaults to the current directory
    pub app_dir: Option<PathBuf>,
    pub stack_prefix: String,
}

impl Default for CdkSettings {
    fn default() -> Self {
        Self {
            command: "npx cdk".to_string(),
            app_dir: None,
            stack_prefix: DEFAULT_STACK_PREFIX.to_string(),
        }
    }
}

impl CdkSettings {
    /// Program and leading arguments of the launcher
    pub fn command_parts(&self) -> (String, Vec<String>) {
        let mut parts = self.command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_else(|| "cdk".to_string());
        (program, parts.collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub data_dir: Option<PathBuf>,
}

impl Settings {
    /// Load from the first config file found, or defaults when there is none
    pub fn load() -> Result<Self> {
        let mut settings = match find_config_file() {
            Ok(path) => Self::from_path(&path)?,
            Err(ConfigError::ConfigFileNotFound) => {
                tracing::debug!("No config file found, using defaults");
                Self::default()
            }
            Err(e) => return Err(e),
        };
        settings.apply_env();
        Ok(settings)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut settings = Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        settings.source = Some(path.to_path_buf());
        tracing::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document deserializes to null
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings = serde_yaml::from_str(content).map_err(|source| {
            ConfigError::Parse {
                path: PathBuf::from("<inline>"),
                source,
            }
        })?;
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.is_empty() {
                self.store.data_dir = Some(PathBuf::from(dir));
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.aws.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "aws.timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.cdk.command.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "cdk.command",
                reason: "must not be empty".to_string(),
            });
        }
        if self.cdk.stack_prefix.is_empty() {
            return Err(ConfigError::Invalid {
                key: "cdk.stack_prefix",
                reason: "must not be empty".to_string(),
            });
        }
        if self.teardown.max_poll_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "teardown.max_poll_attempts",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Where the record store lives: `store.data_dir`, else the platform
    /// data directory, else the config directory.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.store.data_dir {
            return Ok(dir.clone());
        }
        match dirs::data_dir() {
            Some(dir) => Ok(dir.join("bucketflow")),
            None => Ok(get_config_dir()?.join("data")),
        }
    }

    /// Effective stack prefix
    pub fn stack_prefix(&self) -> &str {
        &self.cdk.stack_prefix
    }
}
