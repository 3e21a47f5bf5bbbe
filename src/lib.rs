//! Native Serial Library
//!
//! Thread-safe access to serial devices through a flat native driver
//! interface, plus the machinery that finds, extracts and version-checks a
//! bundled driver library at runtime.
//!
//! # Modules
//!
//! - `host`: Host key (`linux-x64`, `windows-x86`, ...) of the running process
//! - `version`: Semantic versions used to gate driver libraries
//! - `loader`: One-time extraction and loading of bundled native artifacts
//! - `native`: The native call surface and its backends
//! - `port`: Port handles and their byte-stream adapters
//! - `config`: Configuration management with TOML support
//! - `logging`: Tracing subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use native_serial::port::SerialPort;
//! use std::io::Write;
//!
//! let port = SerialPort::open("/dev/ttyUSB0")?;
//! port.writer().write_all(b"AT\r\n")?;
//! port.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod host;
pub mod loader;
pub mod logging;
pub mod native;
pub mod port;
pub mod version;

// Re-export commonly used types for convenience
pub use host::HostKey;
pub use loader::{LoaderError, NativeLibLoader};
pub use native::{MockBridge, NativeBridge};
pub use port::{
    DataBits, Parity, PortError, PortReader, PortSettings, PortWriter, PurgeType, SerialPort,
    StopBits,
};
pub use version::SemanticVersion;
