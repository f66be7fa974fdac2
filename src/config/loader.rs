//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable overriding `queue.broker_address`.
pub const ENV_BROKER_ADDRESS: &str = "KAFKA_ADDR";
/// Environment variable overriding `queue.topic`.
pub const ENV_TOPIC: &str = "KAFKA_TOPIC";

/// Error type for configuration loading.
#[derive(Debug, Error)]
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

/// Command-line values that take precedence over file and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub name: Option<String>,
    pub bind_address: Option<String>,
}

/// Load configuration from an optional TOML file, apply environment and
/// command-line overrides, then validate the result once.
pub fn load_config(path: Option<&Path>, overrides: &Overrides) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ProxyConfig::default(),
    };

    apply_env_overrides(&mut config, std::env::vars());
    apply_overrides(&mut config, overrides);

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

fn apply_overrides(config: &mut ProxyConfig, overrides: &Overrides) {
    if let Some(name) = &overrides.name {
        config.name = name.clone();
    }
    if let Some(addr) = &overrides.bind_address {
        config.listener.bind_address = addr.clone();
    }
    config.listener.bind_address = normalize_bind_address(&config.listener.bind_address);
}

/// Expand a bare `:port` into `0.0.0.0:port`; anything else is kept as is.
pub fn normalize_bind_address(addr: &str) -> String {
    let addr = addr.trim();
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}

/// Override sink settings from `KAFKA_ADDR` / `KAFKA_TOPIC`.
pub fn apply_env_overrides<I>(config: &mut ProxyConfig, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        match key.as_str() {
            ENV_BROKER_ADDRESS => config.queue.broker_address = value,
            ENV_TOPIC => config.queue.topic = value,
            _ => {}
        }
    }
}
