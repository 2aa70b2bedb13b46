//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable holding extra comma-separated API keys.
pub const API_KEYS_ENV: &str = "MCP_API_KEYS";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse, apply environment overrides, and validate.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let mut config: GatewayConfig = toml::from_str(content)?;
    apply_env(&mut config, std::env::var(API_KEYS_ENV).ok().as_deref());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Defaults plus environment overrides, validated.
pub fn default_config() -> Result<GatewayConfig, ConfigError> {
    parse_config("")
}

/// Merge keys from the environment into the configured set, skipping blanks
/// and duplicates.
pub fn apply_env(config: &mut GatewayConfig, env_keys: Option<&str>) {
    let Some(raw) = env_keys else {
        return;
    };
    for key in raw.split(',').map(str::trim).filter(|k| !k.is_empty()) {
        if !config.auth.api_keys.iter().any(|k| k == key) {
            config.auth.api_keys.push(key.to_string());
        }
    }
}
