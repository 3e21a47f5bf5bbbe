//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading, validating or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("Cannot read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`Config`](super::Config).
    #[error("Malformed config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Cannot encode configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Cannot write config file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A value parsed but is out of range or inconsistent.
    #[error("Invalid value for '{key}': {message}")]
    Invalid { key: String, message: String },

    /// A `NATIVE_SERIAL_*` override could not be parsed.
    #[error("Invalid override in ${var}: {message}")]
    Env { var: String, message: String },

    /// A key that must carry a value was set to nothing.
    #[error("'{0}' is set but empty")]
    Missing(String),

    /// Nowhere to save: no file was loaded and no per-user config directory exists.
    #[error("No config file location available")]
    NoLocation,
}

impl ConfigError {
    pub fn validation(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn env_parse(var: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Env {
            var: var.into(),
            message: message.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
