//! `load_config` module: reads the YAML config file and layers environment overrides on top.
//!
//! This is the only place where user-supplied config YAML is parsed into the
//! strongly-typed [`Config`] handed to commands.
//!
//! # Resolution
//! - `--config <path>`: must exist, a missing file is an error.
//! - else `$VSTORE_CONFIG`: same rules as an explicit path.
//! - else `$HOME/.config/vstore/config.yaml`: optional, a missing file means defaults.
//!
//! Environment variables `VSTORE_API_KEY` and `VSTORE_BASE_URL` override the
//! file. Command-line flags override both and are applied by the caller.
//!
//! # Errors
//! All errors use `anyhow::Error` and are surfaced at the CLI boundary.

use anyhow::Result;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use vstore_core::config::Config;

pub const CONFIG_PATH_ENV: &str = "VSTORE_CONFIG";
pub const API_KEY_ENV: &str = "VSTORE_API_KEY";
pub const BASE_URL_ENV: &str = "VSTORE_BASE_URL";

/// `$HOME/.config/vstore/config.yaml`, when `$HOME` is set.
pub fn default_config_path() -> Option<PathBuf> {
    env::var_os("HOME").map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join("vstore")
            .join("config.yaml")
    })
}

/// Loads a YAML config file and applies environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config = parse_config(&config_content).map_err(|e| {
        error!(error = %e, config_path = ?path_ref, "Failed to parse config YAML");
        e
    })?;
    info!(config_path = ?path_ref, "Parsed config YAML successfully");

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Resolves which file to read (see module docs) and loads it.
pub fn resolve_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
        return load_config(PathBuf::from(path));
    }
    match default_config_path() {
        Some(path) if path.exists() => load_config(path),
        _ => {
            info!("No config file found, using defaults");
            let mut config = Config::default();
            apply_env_overrides(&mut config);
            Ok(config)
        }
    }
}

/// Parses config YAML. An empty document yields the defaults.
pub fn parse_config(content: &str) -> Result<Config> {
    if content.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse config YAML: {e}"))
}

/// Overrides `api_key` and `base_url` from the environment. Empty values are ignored.
pub fn apply_env_overrides(config: &mut Config) {
    if let Some(key) = non_empty_env(API_KEY_ENV) {
        info!(env = API_KEY_ENV, "API key taken from environment");
        config.api_key = Some(key);
    }
    if let Some(url) = non_empty_env(BASE_URL_ENV) {
        info!(env = BASE_URL_ENV, base_url = %url, "Base URL taken from environment");
        config.base_url = url;
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
