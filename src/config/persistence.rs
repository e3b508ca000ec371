use crate::error::{Result, UniteError};
use std::path::Path;

use crate::config::paths::*;
use crate::config::schema::*;

/// Load the user config. A missing file means defaults; it is never created.
pub fn load_config() -> Result<Config> {
    let config_path = get_config_path()?;

    if !config_path.exists() {
        tracing::debug!(
            "No config file at {}, using defaults",
            config_path.display()
        );
        let config = Config::default();
        validate_config(&config)?;
        return Ok(config);
    }

    load_config_from(&config_path)
}

/// Load a config file that must exist.
pub fn load_config_from(config_path: &Path) -> Result<Config> {
    let toml_content = std::fs::read_to_string(config_path).map_err(|e| {
        UniteError::Config(format!(
            "Failed to read config file {}: {}",
            config_path.display(),
            e
        ))
    })?;

    let config = parse_config(&toml_content)?;
    tracing::debug!("Loaded config from {}", config_path.display());
    Ok(config)
}

pub fn parse_config(toml_content: &str) -> Result<Config> {
    let config: Config = toml::from_str(toml_content)
        .map_err(|e| UniteError::Config(format!("Failed to parse config: {}", e)))?;
    validate_config(&config)?;
    Ok(config)
}
