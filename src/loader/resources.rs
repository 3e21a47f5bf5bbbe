//! Sources of bundled native artifacts.
//!
//! Artifacts are addressed by resource paths such as `/native/libfoo.so`.
//! A provider either carries them inside the binary (`include_bytes!`) or
//! serves them from a directory shipped next to it.

use super::error::LoaderError;
use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

/// Supplies the bytes of a bundled artifact.
pub trait ResourceProvider: Send + Sync + fmt::Debug {
    /// Open the resource at `path`, or `Ok(None)` if the package does not contain it.
    fn open(&self, path: &str) -> Result<Option<Box<dyn Read + '_>>, LoaderError>;
}

impl<T: ResourceProvider + ?Sized> ResourceProvider for Box<T> {
    fn open(&self, path: &str) -> Result<Option<Box<dyn Read + '_>>, LoaderError> {
        (**self).open(path)
    }
}

/// Strip the leading separator so resource paths can be joined onto directories.
pub(crate) fn relative(path: &str) -> &str {
    path.trim_start_matches(['/', '\\'])
}

/// Resources compiled into the binary.
///
/// ```
/// use native_serial::loader::EmbeddedResources;
///
/// static ARTIFACTS: &[(&str, &[u8])] = &[("/native/demo.bin", b"\x7fELF")];
/// let resources = EmbeddedResources::new(ARTIFACTS);
/// assert!(resources.contains("/native/demo.bin"));
/// ```
#[derive(Clone, Copy)]
pub struct EmbeddedResources {
    entries: &'static [(&'static str, &'static [u8])],
}

impl EmbeddedResources {
    pub const fn new(entries: &'static [(&'static str, &'static [u8])]) -> Self {
        Self { entries }
    }

    pub const fn empty() -> Self {
        Self { entries: &[] }
    }

    fn find(&self, path: &str) -> Option<&'static [u8]> {
        let wanted = relative(path);
        self.entries
            .iter()
            .find(|(name, _)| relative(name) == wanted)
            .map(|(_, bytes)| *bytes)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.find(path).is_some()
    }
}

impl ResourceProvider for EmbeddedResources {
    fn open(&self, path: &str) -> Result<Option<Box<dyn Read + '_>>, LoaderError> {
        Ok(self
            .find(path)
            .map(|bytes| Box::new(Cursor::new(bytes)) as Box<dyn Read>))
    }
}

impl fmt::Debug for EmbeddedResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedResources")
            .field(
                "entries",
                &self.entries.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Resources laid out under a directory on disk, mirroring their resource paths.
#[derive(Debug, Clone)]
pub struct DirectoryResources {
    root: PathBuf,
}

impl DirectoryResources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceProvider for DirectoryResources {
    fn open(&self, path: &str) -> Result<Option<Box<dyn Read + '_>>, LoaderError> {
        let file_path = self.root.join(relative(path));
        match File::open(&file_path) {
            Ok(file) => Ok(Some(Box::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LoaderError::io(file_path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static ENTRIES: &[(&str, &[u8])] = &[("/native/a.so", b"aaa"), ("native/b.so", b"bb")];

    #[test]
    fn test_embedded_lookup_ignores_leading_slash() {
        let resources = EmbeddedResources::new(ENTRIES);
        assert!(resources.contains("native/a.so"));
        assert!(resources.contains("/native/b.so"));
        assert!(!resources.contains("/native/c.so"));
    }

    #[test]
    fn test_embedded_open_reads_bytes() {
        let resources = EmbeddedResources::new(ENTRIES);
        let mut buf = Vec::new();
        resources
            .open("/native/a.so")
            .unwrap()
            .unwrap()
            .read_to_end(&mut buf)
            .unwrap();
        assert_eq!(buf, b"aaa");
    }

    #[test]
    fn test_directory_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let resources = DirectoryResources::new(dir.path());
        assert!(resources.open("/native/none.so").unwrap().is_none());
    }

    #[test]
    fn test_directory_open() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("native")).unwrap();
        std::fs::write(dir.path().join("native/x.so"), b"xyz").unwrap();

        let resources = DirectoryResources::new(dir.path());
        let mut buf = Vec::new();
        resources
            .open("/native/x.so")
            .unwrap()
            .unwrap()
            .read_to_end(&mut buf)
            .unwrap();
        assert_eq!(buf, b"xyz");
    }
}
