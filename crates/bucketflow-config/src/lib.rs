pub mod error;
pub mod settings;

pub use error::*;
pub use settings::{AwsSettings, CdkSettings, Settings, StoreSettings};

use std::path::PathBuf;

/// Environment variable naming a config file directly
pub const CONFIG_PATH_ENV: &str = "BUCKETFLOW_CONFIG_PATH";

const APP_DIR: &str = "bucketflow";
const CANDIDATES: [&str; 4] = [
    "bucketflow.local.yaml",
    ".bucketflow.local.yaml",
    "bucketflow.yaml",
    ".bucketflow.yaml",
];

/// `~/.config/bucketflow`, created if missing
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join(APP_DIR);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Locate the config file.
///
/// Search order:
/// 1. `BUCKETFLOW_CONFIG_PATH`
/// 2. current directory: bucketflow.local.yaml, .bucketflow.local.yaml, bucketflow.yaml, .bucketflow.yaml
/// 3. `./.bucketflow/` with the same names
/// 4. `~/.config/bucketflow/config.yaml`
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!("{} points at missing file {}", CONFIG_PATH_ENV, path.display());
    }

    let current_dir = std::env::current_dir()?;

    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let project_dir = current_dir.join(".bucketflow");
    if project_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = project_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join(APP_DIR).join("config.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_get_config_dir() {
        let config_dir = get_config_dir().unwrap();
        assert!(config_dir.ends_with("bucketflow"));
        assert!(config_dir.exists());
    }

    #[test]
    #[serial]
    fn test_find_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        fs::write(temp_dir.path().join("bucketflow.yaml"), "aws: {}").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = find_config_file();
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with("bucketflow.yaml"));
    }

    #[test]
    #[serial]
    fn test_local_file_wins() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        fs::write(temp_dir.path().join("bucketflow.yaml"), "").unwrap();
        fs::write(temp_dir.path().join(".bucketflow.local.yaml"), "").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = find_config_file().unwrap();
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.ends_with(".bucketflow.local.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_in_project_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        let project_dir = temp_dir.path().join(".bucketflow");
        fs::create_dir(&project_dir).unwrap();
        fs::write(project_dir.join("bucketflow.yaml"), "").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = find_config_file().unwrap();
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.ends_with(".bucketflow/bucketflow.yaml"));
    }

    #[test]
    #[serial]
    fn test_env_var_takes_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, "").unwrap();
        fs::write(temp_dir.path().join("bucketflow.yaml"), "").unwrap();

        unsafe {
            std::env::set_var(CONFIG_PATH_ENV, &config_path);
        }
        std::env::set_current_dir(&temp_dir).unwrap();
        let result = find_config_file();
        std::env::set_current_dir(original_dir).unwrap();
        unsafe {
            std::env::remove_var(CONFIG_PATH_ENV);
        }

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    #[serial]
    fn test_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = find_config_file();
        std::env::set_current_dir(original_dir).unwrap();

        // A global config on the machine running the tests is a legitimate hit
        match result {
            Err(ConfigError::ConfigFileNotFound) => {}
            Ok(path) => assert!(path.ends_with("bucketflow/config.yaml")),
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
}
