use std::fs;
use std::path::{Path, PathBuf};

use crate::proxy::ProxyConfig;

const DATA_DIR: &str = ".sched_portal";
const CONFIG_FILE: &str = "portal_config.json";

/// Get data directory path, creating it when missing
pub fn get_data_dir() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Failed to get user home directory")?;
    let data_dir = home.join(DATA_DIR);

    if !data_dir.exists() {
        fs::create_dir_all(&data_dir)
            .map_err(|e| format!("Failed to create data directory: {}", e))?;
    }

    Ok(data_dir)
}

/// Load portal configuration from the data directory
pub fn load_portal_config() -> Result<ProxyConfig, String> {
    let data_dir = get_data_dir()?;
    load_config_from(&data_dir.join(CONFIG_FILE))
}

/// Save portal configuration to the data directory
pub fn save_portal_config(config: &ProxyConfig) -> Result<(), String> {
    let data_dir = get_data_dir()?;
    save_config_to(&data_dir.join(CONFIG_FILE), config)
}

/// Load configuration from an explicit path; a missing file is written with defaults
pub fn load_config_from(config_path: &Path) -> Result<ProxyConfig, String> {
    if !config_path.exists() {
        let config = ProxyConfig::default();
        save_config_to(config_path, &config)?;
        return Ok(config);
    }

    let content = fs::read_to_string(config_path)
        .map_err(|e| format!("Failed to read config file: {}", e))?;

    let raw: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse config file: {}", e))?;
    let secret_missing = raw.get("session_secret").is_none();

    let config: ProxyConfig = serde_json::from_value(raw)
        .map_err(|e| format!("Failed to parse config file: {}", e))?;

    // Persist a freshly generated secret
    if secret_missing {
        save_config_to(config_path, &config)?;
    }

    Ok(config)
}

pub fn save_config_to(config_path: &Path, config: &ProxyConfig) -> Result<(), String> {
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    fs::write(config_path, content).map_err(|e| format!("Failed to save config: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_is_created_and_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let first = load_config_from(&path).unwrap();
        assert!(path.exists());

        let second = load_config_from(&path).unwrap();
        assert_eq!(first.session_secret, second.session_secret);
        assert_eq!(second.upstream_origin, "http://localhost:8080");
    }

    #[test]
    fn test_generated_secret_is_persisted_for_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, r#"{"port": 4100}"#).unwrap();

        let first = load_config_from(&path).unwrap();
        let second = load_config_from(&path).unwrap();
        assert_eq!(first.port, 4100);
        assert_eq!(first.session_secret, second.session_secret);
    }

    #[test]
    fn test_invalid_config_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "{ not json").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert!(err.starts_with("Failed to parse config file"));
    }
}
