//! Configuration schema definitions.
//!
//! Every section carries `#[serde(default)]`, so a file only needs the keys
//! it changes.

use super::error::{ConfigError, ConfigResult};
use crate::version::SemanticVersion;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Native driver selection and library loading
    pub native: NativeConfig,
    /// Serial port conveniences
    pub serial: SerialConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Check values that serde cannot.
    pub fn validate(&self) -> ConfigResult<()> {
        let (min, max) = self.native.version_range()?;
        if min >= max {
            return Err(ConfigError::validation(
                "native.max_version",
                format!("must be greater than min_version ({min} >= {max})"),
            ));
        }
        if let Some(name) = &self.native.temp_dir_name {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(ConfigError::validation(
                    "native.temp_dir_name",
                    "must be a single non-empty path component",
                ));
            }
        }
        for (key, dir) in [
            ("native.base_dir", &self.native.base_dir),
            ("native.resource_dir", &self.native.resource_dir),
        ] {
            if dir.as_ref().is_some_and(|d| d.as_os_str().is_empty()) {
                return Err(ConfigError::Missing(key.to_string()));
            }
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::validation("logging.level", "must not be empty"));
        }
        Ok(())
    }
}

/// Which driver backs the process-wide bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Operating system devices through the `serialport` crate
    #[default]
    Serialport,
    /// A bundled native library, extracted and version-checked at startup
    Library,
}

/// Native section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeConfig {
    pub backend: Backend,
    /// Extraction directory; `~/.native-serial` when unset
    pub base_dir: Option<PathBuf>,
    /// Extract into a fresh directory with this name under the system temp
    /// dir instead of `base_dir`. Removed at exit where the platform allows.
    pub temp_dir_name: Option<String>,
    /// Read artifacts from this directory instead of the ones built in
    pub resource_dir: Option<PathBuf>,
    /// Lowest accepted library version (inclusive)
    pub min_version: String,
    /// First rejected library version (exclusive)
    pub max_version: String,
    /// Initial read timeout for ports opened through the `serialport` backend
    pub default_read_timeout_ms: u64,
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            base_dir: None,
            temp_dir_name: None,
            resource_dir: None,
            min_version: "0.1.0".to_string(),
            max_version: "1.0.0".to_string(),
            default_read_timeout_ms: 1000,
        }
    }
}

impl NativeConfig {
    /// Parsed `[min_version, max_version)`.
    pub fn version_range(&self) -> ConfigResult<(SemanticVersion, SemanticVersion)> {
        let parse = |key: &str, value: &str| {
            value
                .parse::<SemanticVersion>()
                .map_err(|e| ConfigError::validation(key, e.to_string()))
        };
        Ok((
            parse("native.min_version", &self.min_version)?,
            parse("native.max_version", &self.max_version)?,
        ))
    }

    pub fn default_read_timeout(&self) -> Duration {
        Duration::from_millis(self.default_read_timeout_ms)
    }

    /// `base_dir`, or `.native-serial` under the user's home directory.
    pub fn resolved_base_dir(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(default_base_dir)
    }
}

/// `~/.native-serial`, or a relative `.native-serial` when no home exists.
pub fn default_base_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".native-serial"))
        .unwrap_or_else(|| PathBuf::from(".native-serial"))
}

/// Serial port configuration section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port opened by tools when none is given
    pub default_port: Option<String>,
    /// Port aliases for convenience
    pub port_aliases: HashMap<String, String>,
}

impl SerialConfig {
    /// Resolve a port name through aliases
    pub fn resolve_port<'a>(&'a self, name: &'a str) -> &'a str {
        self.port_aliases
            .get(name)
            .map(|s| s.as_str())
            .unwrap_or(name)
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.native.backend, Backend::Serialport);
        assert_eq!(config.native.min_version, "0.1.0");
        assert_eq!(config.native.max_version, "1.0.0");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        config.validate().unwrap();
    }

    #[test]
    fn test_default_base_dir_name() {
        let dir = NativeConfig::default().resolved_base_dir();
        assert!(dir.ends_with(".native-serial"));
    }

    #[test]
    fn test_port_alias_resolution() {
        let mut config = SerialConfig::default();
        config
            .port_aliases
            .insert("arduino".to_string(), "COM3".to_string());

        assert_eq!(config.resolve_port("arduino"), "COM3");
        assert_eq!(config.resolve_port("COM5"), "COM5");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[native]"));
        assert!(toml_str.contains("[logging]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [native]
            backend = "library"
            max_version = "0.9.0"

            [serial]
            default_port = "COM7"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.native.backend, Backend::Library);
        assert_eq!(config.native.max_version, "0.9.0");
        assert_eq!(config.serial.default_port.as_deref(), Some("COM7"));
        // Defaults should still work
        assert_eq!(config.native.min_version, "0.1.0");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let mut config = Config::default();
        config.native.min_version = "2.0.0".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { .. })
        ));

        config.native.min_version = "not.a.version".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_temp_dir_name() {
        let mut config = Config::default();
        config.native.temp_dir_name = Some("a/b".to_string());
        assert!(config.validate().is_err());
    }
}
