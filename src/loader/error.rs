//! Loader error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while registering, extracting or loading native artifacts.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Registration attempted after initialization started.
    #[error("Native library loader already initialized")]
    AlreadyInitialized,

    /// Empty host key or artifact path.
    #[error("Invalid registration: {0}")]
    InvalidRegistration(String),

    /// The exact (host, path) pair was registered twice.
    #[error("Embedded library already registered for {host}: {path}")]
    DuplicateRegistration { host: String, path: String },

    /// The running OS/architecture has no host key.
    #[error("Unsupported native host (os: \"{os}\", arch: \"{arch}\")")]
    UnsupportedHost { os: String, arch: String },

    /// Filesystem failure while preparing or extracting artifacts.
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A registered artifact is not part of the package. Indicates a build defect.
    #[error("No such embedded resource: {0}")]
    MissingResource(String),

    /// The OS refused to load the extracted artifact.
    #[error("Failed to load native library '{path}': {message}")]
    Link { path: PathBuf, message: String },

    /// A required entry point is not exported by the library.
    #[error("Missing native symbol '{symbol}': {message}")]
    MissingSymbol { symbol: String, message: String },

    /// A configured version bound does not parse.
    #[error("Invalid version bound '{key}': {message}")]
    InvalidVersion { key: String, message: String },

    /// The artifact loaded but failed the compatibility check.
    #[error("Incompatible native library for {host}: {path}")]
    Incompatible { host: String, path: PathBuf },

    /// No free temporary directory name was found.
    #[error("Too many attempts trying to create directory {0}")]
    TooManyAttempts(PathBuf),
}

// `io::Error` is not `Clone`; a copy keeps its kind and message so every
// caller of a failed initialization can be handed the same variant.
impl Clone for LoaderError {
    fn clone(&self) -> Self {
        match self {
            Self::AlreadyInitialized => Self::AlreadyInitialized,
            Self::InvalidRegistration(m) => Self::InvalidRegistration(m.clone()),
            Self::DuplicateRegistration { host, path } => Self::DuplicateRegistration {
                host: host.clone(),
                path: path.clone(),
            },
            Self::UnsupportedHost { os, arch } => Self::UnsupportedHost {
                os: os.clone(),
                arch: arch.clone(),
            },
            Self::Io { path, source } => Self::Io {
                path: path.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            Self::MissingResource(p) => Self::MissingResource(p.clone()),
            Self::Link { path, message } => Self::Link {
                path: path.clone(),
                message: message.clone(),
            },
            Self::MissingSymbol { symbol, message } => Self::MissingSymbol {
                symbol: symbol.clone(),
                message: message.clone(),
            },
            Self::InvalidVersion { key, message } => Self::InvalidVersion {
                key: key.clone(),
                message: message.clone(),
            },
            Self::Incompatible { host, path } => Self::Incompatible {
                host: host.clone(),
                path: path.clone(),
            },
            Self::TooManyAttempts(p) => Self::TooManyAttempts(p.clone()),
        }
    }
}

impl LoaderError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRegistration(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LoaderError::DuplicateRegistration {
            host: "linux-x64".to_string(),
            path: "/native/lib.so".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Embedded library already registered for linux-x64: /native/lib.so"
        );

        let err = LoaderError::Incompatible {
            host: "windows-x64".to_string(),
            path: PathBuf::from("C:/tmp/lib.dll"),
        };
        assert!(err.to_string().contains("windows-x64"));
    }

    #[test]
    fn test_clone_keeps_io_kind() {
        let err = LoaderError::io(
            "/tmp/out",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        match err.clone() {
            LoaderError::Io { path, source } => {
                assert_eq!(path, PathBuf::from("/tmp/out"));
                assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
                assert_eq!(source.to_string(), "denied");
            }
            other => panic!("expected io error, got {other:?}"),
        }
    }
}
