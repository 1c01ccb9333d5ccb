//! Configuration file resolution.
//!
//! Resolution order:
//! 1. Explicit CLI path
//! 2. `PM_CONFIG` environment variable
//! 3. XDG config directory (`~/.config/portal-metrics/config.toml`)
//! 4. Built-in defaults

use std::path::{Path, PathBuf};

use super::{ConfigError, ServiceConfig};

/// Environment variable pointing at a config file.
pub const ENV_CONFIG_PATH: &str = "PM_CONFIG";

/// Application directory name under the XDG config dir.
const APP_NAME: &str = "portal-metrics";

/// Standard config file name.
const CONFIG_FILENAME: &str = "config.toml";

/// Where the configuration came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,
    /// Set via environment variable.
    Environment,
    /// Found in XDG config directory.
    XdgConfig,
    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "cli"),
            ConfigSource::Environment => write!(f, "env"),
            ConfigSource::XdgConfig => write!(f, "xdg"),
            ConfigSource::BuiltinDefault => write!(f, "default"),
        }
    }
}

/// A loaded configuration together with its origin.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: ServiceConfig,
    pub source: ConfigSource,
    pub path: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Resolve, load, apply env overrides and validate.
    pub fn load(cli_path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = Self::resolve(cli_path)?;
        resolved.config.validate()?;
        Ok(resolved)
    }

    /// Resolve and load with env overrides, leaving validation to the caller.
    ///
    /// Lets a command swap the sink before the result is checked.
    pub fn resolve(cli_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, source) = resolve_config_path(cli_path, std::env::var(ENV_CONFIG_PATH).ok());
        let config = match &path {
            Some(path) => ServiceConfig::from_file(path)?,
            None => ServiceConfig::default(),
        }
        .apply_env();
        Ok(ResolvedConfig {
            config,
            source,
            path,
        })
    }
}

/// Pick the config file to load.
///
/// A CLI path is returned even when it does not exist so that loading reports
/// the I/O error instead of silently falling back to defaults.
pub fn resolve_config_path(
    cli_path: Option<&Path>,
    env_path: Option<String>,
) -> (Option<PathBuf>, ConfigSource) {
    if let Some(path) = cli_path {
        return (Some(path.to_path_buf()), ConfigSource::CliArgument);
    }

    if let Some(env_path) = env_path.filter(|p| !p.trim().is_empty()) {
        return (Some(PathBuf::from(env_path)), ConfigSource::Environment);
    }

    if let Some(path) = xdg_config_path().filter(|p| p.exists()) {
        return (Some(path), ConfigSource::XdgConfig);
    }

    (None, ConfigSource::BuiltinDefault)
}

/// Default config path under the XDG config directory.
pub fn xdg_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME).join(CONFIG_FILENAME))
}
