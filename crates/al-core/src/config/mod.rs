//! Configuration loading and validation.
//!
//! Resolution order for the config file (highest priority first):
//! 1. `--config PATH`
//! 2. `ADC_LOGGER_CONFIG`
//! 3. `$XDG_CONFIG_HOME/adc_logger/config.json` (or `~/.config/...`)
//! 4. Built-in defaults
//!
//! An explicitly named file must exist; the XDG file is optional. CLI flags
//! are applied on top of the loaded values by the caller.

pub mod validation;

pub use validation::{validate_config, ValidationError};

use al_common::DEFAULT_REFERENCE_LABEL;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Schema version for config files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "ADC_LOGGER_CONFIG";

const CONFIG_DIR_NAME: &str = "adc_logger";
const CONFIG_FILE_NAME: &str = "config.json";

pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD: u32 = 115_200;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_SETTLE_MS: u64 = 2_000;
pub const DEFAULT_FILE_PREFIX: &str = "adc_log";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("invalid JSON in config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("schema version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },

    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),
}

/// Serial transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub port: String,
    pub baud: u32,
    pub read_timeout_ms: u64,
    /// Wait after opening the port before the first prompt.
    pub settle_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        TransportSettings {
            port: DEFAULT_PORT.to_string(),
            baud: DEFAULT_BAUD,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            settle_ms: DEFAULT_SETTLE_MS,
        }
    }
}

/// Session and output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Samples per round; prompted for when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<usize>,
    pub reference_label: String,
    /// Table directory; the desktop (or the working directory) when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            samples: None,
            reference_label: DEFAULT_REFERENCE_LABEL.to_string(),
            output_dir: None,
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
        }
    }
}

impl SessionSettings {
    /// Directory that receives the table.
    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(default_output_dir)
    }
}

/// Contents of `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub transport: TransportSettings,
    #[serde(default)]
    pub session: SessionSettings,
}

fn default_schema_version() -> String {
    CONFIG_SCHEMA_VERSION.to_string()
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            schema_version: default_schema_version(),
            transport: TransportSettings::default(),
            session: SessionSettings::default(),
        }
    }
}

/// Loaded configuration with provenance.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: LoggerConfig,
    /// File the values came from (`None` when using defaults).
    pub path: Option<PathBuf>,
}

/// Config resolution inputs.
#[derive(Debug, Default, Clone)]
pub struct ConfigOptions {
    /// Explicit config file (`--config`).
    pub config_path: Option<PathBuf>,
}

/// Load and validate configuration using the standard resolution order.
pub fn load_config(options: &ConfigOptions) -> Result<ResolvedConfig, ConfigError> {
    let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let resolved = resolve(options.config_path.as_deref(), env_path.as_deref(), &default_config_path())?;
    validate_config(&resolved.config)?;
    Ok(resolved)
}

/// Resolution with every input explicit.
fn resolve(
    explicit: Option<&Path>,
    from_env: Option<&Path>,
    xdg_path: &Path,
) -> Result<ResolvedConfig, ConfigError> {
    if let Some(path) = explicit.or(from_env) {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        return Ok(ResolvedConfig {
            config: load_config_file(path)?,
            path: Some(path.to_path_buf()),
        });
    }

    if xdg_path.exists() {
        return Ok(ResolvedConfig {
            config: load_config_file(xdg_path)?,
            path: Some(xdg_path.to_path_buf()),
        });
    }

    Ok(ResolvedConfig {
        config: LoggerConfig::default(),
        path: None,
    })
}

/// Parse one config file and check its schema version.
pub fn load_config_file(path: &Path) -> Result<LoggerConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config: LoggerConfig =
        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(ConfigError::VersionMismatch {
            expected: CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version,
        });
    }
    Ok(config)
}

/// `$XDG_CONFIG_HOME/adc_logger/config.json`.
pub fn default_config_path() -> PathBuf {
    let xdg_config = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
        });
    xdg_config.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)
}

/// The user's desktop, falling back to the working directory.
pub fn default_output_dir() -> PathBuf {
    dirs::desktop_dir().unwrap_or_else(|| PathBuf::from("."))
}
