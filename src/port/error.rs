//! Port-specific error types.

use crate::loader::LoaderError;
use std::io;
use thiserror::Error;

/// Errors raised by port handles, stream adapters and the native bridge.
#[derive(Debug, Error)]
pub enum PortError {
    /// An operation other than read/write was attempted on a closed port.
    #[error("Port is not open")]
    NotOpen,

    /// Write or flush after close.
    #[error("Port is closed")]
    Closed,

    /// No data arrived before the read timeout expired.
    #[error("Operation timed out")]
    Timeout,

    #[error("Access denied")]
    AccessDenied,

    /// Generic I/O failure reported by the driver.
    #[error("Native I/O error")]
    Io,

    /// Any other driver error code.
    #[error("Native error {0}")]
    Native(i32),

    #[error("Invalid read timeout: {0} ms")]
    InvalidTimeout(i64),

    #[error("Invalid port name: {0:?}")]
    InvalidName(String),

    #[error("Baud rate out of range: {0}")]
    InvalidBaud(u32),

    /// The driver returned a code outside the shared code table.
    #[error("Unsupported {kind} code from native layer: {code}")]
    UnsupportedCode { kind: &'static str, code: i32 },

    #[error(transparent)]
    Loader(#[from] LoaderError),
}

impl PortError {
    /// Whether the error only means "no data yet".
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl From<PortError> for io::Error {
    fn from(err: PortError) -> Self {
        let kind = match &err {
            PortError::Timeout => io::ErrorKind::TimedOut,
            PortError::AccessDenied => io::ErrorKind::PermissionDenied,
            PortError::NotOpen | PortError::Closed => io::ErrorKind::NotConnected,
            PortError::InvalidTimeout(_)
            | PortError::InvalidName(_)
            | PortError::InvalidBaud(_) => io::ErrorKind::InvalidInput,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
