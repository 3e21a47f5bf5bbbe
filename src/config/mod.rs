//! Configuration module for native-serial.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `NATIVE_SERIAL_CONFIG` environment variable (explicit path)
//! 2. `./native-serial.toml` (current directory)
//! 3. `~/.config/native-serial/config.toml` (Linux), or the platform's
//!    per-user config directory elsewhere
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! Any configuration value can be overridden via environment variables.
//! The pattern is: `NATIVE_SERIAL_<SECTION>_<KEY>`
//!
//! Examples:
//! - `NATIVE_SERIAL_NATIVE_BACKEND=library`
//! - `NATIVE_SERIAL_NATIVE_MAX_VERSION=2.0.0`
//! - `NATIVE_SERIAL_LOGGING_LEVEL=debug`
//!
//! # Example
//!
//! ```rust,no_run
//! use native_serial::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//! println!("Backend: {:?}", config.native.backend);
//! # Ok::<(), native_serial::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{
    default_base_dir, Backend, Config, LogFormat, LoggingConfig, NativeConfig, SerialConfig,
};
