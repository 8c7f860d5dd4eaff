//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::BridgeConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Backend socket path.
pub const ENV_SOCKET_PATH: &str = "CGI_PROXY_SOCKET_PATH";
/// Base path prefix stripped from incoming paths.
pub const ENV_BASE_PATH: &str = "CGI_PROXY_BASE_PATH";
/// Listener address for `serve`.
pub const ENV_BIND_ADDRESS: &str = "CGI_PROXY_BIND_ADDRESS";
/// Log filter directive.
pub const ENV_LOG_LEVEL: &str = "CGI_PROXY_LOG_LEVEL";
/// Log output format (`pretty` or `json`).
pub const ENV_LOG_FORMAT: &str = "CGI_PROXY_LOG_FORMAT";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment error: {0}")]
    Env(String),

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

/// Load a configuration from an optional TOML file, an optional dotenv file
/// and the process environment, then validate it.
///
/// Precedence, lowest first: defaults, TOML file, environment. The dotenv
/// file only feeds the environment, and never overrides variables that are
/// already set.
pub fn load_config(
    config_path: Option<&Path>,
    env_file: Option<&Path>,
) -> Result<BridgeConfig, ConfigError> {
    let mut config = match config_path {
        Some(path) => load_file(path)?,
        None => BridgeConfig::default(),
    };

    load_env_file(env_file)?;
    apply_env(&mut config, |key| std::env::var(key).ok())?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse a TOML configuration file without validating it.
pub fn load_file(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

fn load_env_file(env_file: Option<&Path>) -> Result<(), ConfigError> {
    let result = match env_file {
        Some(path) => dotenvy::from_path(path).map(|_| ()),
        None => dotenvy::dotenv().map(|_| ()),
    };

    match result {
        Ok(()) => Ok(()),
        // An absent `.env` is the common case under a web server.
        Err(err) if err.not_found() && env_file.is_none() => Ok(()),
        Err(err) => Err(ConfigError::Env(err.to_string())),
    }
}

/// Overlay `CGI_PROXY_*` variables onto a configuration.
///
/// `lookup` abstracts the environment so tests need not touch process state.
pub fn apply_env<F>(config: &mut BridgeConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(socket_path) = lookup(ENV_SOCKET_PATH) {
        config.backend.socket_path = PathBuf::from(socket_path);
    }
    if let Some(base_path) = lookup(ENV_BASE_PATH) {
        config.backend.base_path = base_path;
    }
    if let Some(bind_address) = lookup(ENV_BIND_ADDRESS) {
        config.listener.bind_address = bind_address;
    }
    if let Some(level) = lookup(ENV_LOG_LEVEL) {
        config.logging.level = level;
    }
    if let Some(format) = lookup(ENV_LOG_FORMAT) {
        config.logging.format = format
            .parse()
            .map_err(|e| ConfigError::Env(format!("{}: {}", ENV_LOG_FORMAT, e)))?;
    }
    Ok(())
}
