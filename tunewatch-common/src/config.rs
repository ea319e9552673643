//! Configuration loading and data folder resolution

use crate::{Error, Result};
use std::path::PathBuf;

/// Data folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file (`data_folder` key)
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_folder(cli_arg: Option<&str>, env_var_name: &str) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return Ok(PathBuf::from(path));
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = find_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(data_folder) = config.get("data_folder").and_then(|v| v.as_str()) {
                    return Ok(PathBuf::from(data_folder));
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    Ok(default_data_folder())
}

/// Get default configuration file path for the platform
fn find_config_file() -> Result<PathBuf> {
    if cfg!(target_os = "linux") {
        // Try ~/.config/tunewatch/config.toml first, then /etc/tunewatch/config.toml
        if let Some(path) = dirs::config_dir().map(|d| d.join("tunewatch").join("config.toml")) {
            if path.exists() {
                return Ok(path);
            }
        }
        let system_config = PathBuf::from("/etc/tunewatch/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
        return Err(Error::Config("No config file found".to_string()));
    }

    let config_path = dirs::config_dir()
        .map(|d| d.join("tunewatch").join("config.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

    if config_path.exists() {
        Ok(config_path)
    } else {
        Err(Error::Config(format!("Config file not found: {:?}", config_path)))
    }
}

/// Get OS-dependent default data folder path
fn default_data_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("tunewatch"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/tunewatch"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("tunewatch"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/tunewatch"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("tunewatch"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\tunewatch"))
    } else {
        PathBuf::from("./tunewatch_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_arg_takes_priority() {
        let resolved = resolve_data_folder(Some("/tmp/tw-test"), "TUNEWATCH_NO_SUCH_VAR").unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/tw-test"));
    }

    #[test]
    fn test_env_var_used_when_no_cli_arg() {
        std::env::set_var("TUNEWATCH_TEST_DATA_DIR", "/tmp/tw-env");
        let resolved = resolve_data_folder(None, "TUNEWATCH_TEST_DATA_DIR").unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/tw-env"));
        std::env::remove_var("TUNEWATCH_TEST_DATA_DIR");
    }

    #[test]
    fn test_fallback_resolves_to_some_path() {
        let resolved = resolve_data_folder(None, "TUNEWATCH_NO_SUCH_VAR").unwrap();
        assert!(!resolved.as_os_str().is_empty());
    }
}
