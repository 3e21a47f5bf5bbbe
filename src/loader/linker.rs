//! Loading extracted artifacts into the process.

use super::error::LoaderError;
use std::path::Path;

/// Maps an extracted artifact into the process's native symbol space.
pub trait Linker: Send + Sync {
    /// Handle kept alive for as long as the library must stay mapped.
    type Library: Send + Sync + 'static;

    fn link(&self, path: &Path) -> Result<Self::Library, LoaderError>;
}

/// Loads shared libraries through the platform dynamic loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct DynamicLinker;

impl Linker for DynamicLinker {
    type Library = libloading::Library;

    fn link(&self, path: &Path) -> Result<Self::Library, LoaderError> {
        // SAFETY: loading runs the library's initializers. Artifacts come from
        // the package itself, and the caller gates them with a compatibility
        // check before any symbol is used.
        unsafe { libloading::Library::new(path) }.map_err(|e| LoaderError::Link {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_rejects_non_library() {
        let tmp = tempfile::tempdir().unwrap();
        let bogus = tmp.path().join("bogus.so");
        std::fs::write(&bogus, b"definitely not an object file").unwrap();

        let err = DynamicLinker.link(&bogus).unwrap_err();
        assert!(matches!(err, LoaderError::Link { ref path, .. } if path == &bogus));
    }
}
