//! Configuration loading and data folder resolution

use crate::{Error, Result};
use std::path::PathBuf;

/// Resolve the service data folder with the following priority order:
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
    if let Some(path) = config_file_string("data_folder") {
        return Ok(PathBuf::from(path));
    }

    // Priority 4: OS-dependent compiled default
    Ok(default_data_folder())
}

/// Resolve the remote progress service base URL.
///
/// Same priority chain as the data folder; falls back to a loopback
/// default so the tracker runs (with swallowed remote-write failures)
/// when no remote endpoint is deployed.
pub fn resolve_remote_url(cli_arg: Option<&str>, env_var_name: &str) -> String {
    if let Some(url) = cli_arg {
        return url.to_string();
    }

    if let Ok(url) = std::env::var(env_var_name) {
        return url;
    }

    if let Some(url) = config_file_string("remote_url") {
        return url;
    }

    "http://127.0.0.1:5811/api/v1".to_string()
}

/// Read a string key from the platform config file, if it exists
fn config_file_string(key: &str) -> Option<String> {
    let config_path = find_config_file().ok()?;
    let toml_content = std::fs::read_to_string(&config_path).ok()?;
    let config = toml::from_str::<toml::Value>(&toml_content).ok()?;
    config.get(key).and_then(|v| v.as_str()).map(String::from)
}

/// Locate the config file for the platform (`<config dir>/lumo/config.toml`,
/// with `/etc/lumo/config.toml` as a system-wide fallback on Linux)
fn find_config_file() -> Result<PathBuf> {
    if let Some(path) = dirs::config_dir().map(|d| d.join("lumo").join("config.toml")) {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/lumo/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// OS-dependent default data folder
fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("lumo"))
        .unwrap_or_else(|| PathBuf::from("./lumo_data"))
}
