//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Backend, Config, LogFormat};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "NATIVE_SERIAL";

/// Config file name in the current directory
const LOCAL_CONFIG_FILE: &str = "native-serial.toml";

/// Config file name inside the per-user config directory
const CONFIG_FILE_NAME: &str = "config.toml";

/// Application directory name
const APP_DIR: &str = "native-serial";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "NATIVE_SERIAL_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `NATIVE_SERIAL_CONFIG` environment variable (explicit path)
    /// 2. `./native-serial.toml` (current directory)
    /// 3. `<config dir>/native-serial/config.toml`
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables can override any config file values.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self { config_path, config })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        // Env overrides still apply; a bad one leaves the default in place.
        if apply_env_overrides(&mut config).is_err() || config.validate().is_err() {
            config = Config::default();
        }

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save to the file this configuration was loaded from, or to the
    /// per-user config path when it came from defaults. Returns the path written.
    pub fn save(&self) -> ConfigResult<PathBuf> {
        let path = self
            .config_path
            .clone()
            .or_else(get_default_config_path)
            .ok_or(ConfigError::NoLocation)?;

        save_to_file(&self.config, &path)?;
        Ok(path)
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // 1. Explicit environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. Current directory
    let cwd_config = PathBuf::from(LOCAL_CONFIG_FILE);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. Per-user config directory
    get_default_config_path().filter(|path| path.exists())
}

/// Get the default config directory for creating new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.config_dir().join(APP_DIR))
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::Parse)
}

/// Save configuration to a file.
fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

fn env_var(key: &str) -> (String, Option<String>) {
    let var = format!("{ENV_PREFIX}_{key}");
    let value = std::env::var(&var).ok();
    (var, value)
}

fn parse_env<T: FromStr>(var: &str, value: &str, what: &str) -> ConfigResult<T> {
    value
        .parse()
        .map_err(|_| ConfigError::env_parse(var, format!("Invalid {what}")))
}

impl FromStr for Backend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "serialport" => Ok(Self::Serialport),
            "library" => Ok(Self::Library),
            _ => Err(()),
        }
    }
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            _ => Err(()),
        }
    }
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `NATIVE_SERIAL_<SECTION>_<KEY>`
/// For example:
/// - `NATIVE_SERIAL_NATIVE_BACKEND=library`
/// - `NATIVE_SERIAL_NATIVE_BASE_DIR=/opt/native-serial`
/// - `NATIVE_SERIAL_LOGGING_LEVEL=debug`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    // Native overrides
    if let (var, Some(val)) = env_var("NATIVE_BACKEND") {
        config.native.backend = parse_env(&var, &val, "backend")?;
    }
    if let (_, Some(val)) = env_var("NATIVE_BASE_DIR") {
        config.native.base_dir = Some(PathBuf::from(val));
    }
    if let (_, Some(val)) = env_var("NATIVE_TEMP_DIR_NAME") {
        config.native.temp_dir_name = Some(val);
    }
    if let (_, Some(val)) = env_var("NATIVE_RESOURCE_DIR") {
        config.native.resource_dir = Some(PathBuf::from(val));
    }
    if let (_, Some(val)) = env_var("NATIVE_MIN_VERSION") {
        config.native.min_version = val;
    }
    if let (_, Some(val)) = env_var("NATIVE_MAX_VERSION") {
        config.native.max_version = val;
    }
    if let (var, Some(val)) = env_var("NATIVE_DEFAULT_READ_TIMEOUT_MS") {
        config.native.default_read_timeout_ms = parse_env(&var, &val, "timeout")?;
    }

    // Serial overrides
    if let (_, Some(val)) = env_var("SERIAL_DEFAULT_PORT") {
        config.serial.default_port = Some(val);
    }

    // Logging overrides
    if let (_, Some(val)) = env_var("LOGGING_LEVEL") {
        config.logging.level = val;
    }
    if let (var, Some(val)) = env_var("LOGGING_FORMAT") {
        config.logging.format = parse_env(&var, &val, "log format")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_default_loader() {
        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().native.backend, Backend::Serialport);
        assert!(loader.config_path.is_none());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        env::set_var("NATIVE_SERIAL_NATIVE_BACKEND", "library");
        env::set_var("NATIVE_SERIAL_LOGGING_FORMAT", "JSON");

        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().native.backend, Backend::Library);
        assert_eq!(loader.config().logging.format, LogFormat::Json);

        env::remove_var("NATIVE_SERIAL_NATIVE_BACKEND");
        env::remove_var("NATIVE_SERIAL_LOGGING_FORMAT");
    }

    #[test]
    #[serial]
    fn test_bad_env_value_is_reported() {
        env::set_var("NATIVE_SERIAL_NATIVE_DEFAULT_READ_TIMEOUT_MS", "soon");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();
        let err = ConfigLoader::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));

        // Defaults survive a bad override.
        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().native.default_read_timeout_ms, 1000);

        env::remove_var("NATIVE_SERIAL_NATIVE_DEFAULT_READ_TIMEOUT_MS");
    }

    #[test]
    #[serial]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut loader = ConfigLoader::with_defaults();
        loader.config.native.min_version = "0.2.0".to_string();
        loader.save_to(&path).unwrap();

        let mut loaded = ConfigLoader::load_from(&path).unwrap();
        assert_eq!(loaded.config().native.min_version, "0.2.0");
        assert_eq!(loaded.config_path.as_deref(), Some(path.as_path()));

        // `save` goes back to the file the configuration came from.
        loaded.config.serial.default_port = Some("/dev/ttyACM0".to_string());
        assert_eq!(loaded.save().unwrap(), path);
        let reloaded = ConfigLoader::load_from(&path).unwrap();
        assert_eq!(
            reloaded.config().serial.default_port.as_deref(),
            Some("/dev/ttyACM0")
        );
    }

    #[test]
    #[serial]
    fn test_empty_path_override_is_missing() {
        env::set_var("NATIVE_SERIAL_NATIVE_RESOURCE_DIR", "");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();
        let err = ConfigLoader::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ref key) if key == "native.resource_dir"));

        env::remove_var("NATIVE_SERIAL_NATIVE_RESOURCE_DIR");
    }

    #[test]
    #[serial]
    fn test_explicit_path_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[serial]\ndefault_port = \"COM42\"\n").unwrap();
        env::set_var(CONFIG_PATH_ENV, &path);

        let loader = ConfigLoader::load().unwrap();
        assert_eq!(loader.config().serial.default_port.as_deref(), Some("COM42"));

        env::remove_var(CONFIG_PATH_ENV);
    }

    #[test]
    #[serial]
    fn test_invalid_file_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[native]\nmin_version = \"1.0.0\"\n").unwrap();

        assert!(matches!(
            ConfigLoader::load_from(&path),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
