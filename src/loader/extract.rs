//! Filesystem side of artifact extraction.

use super::error::LoaderError;
use super::resources::{relative, ResourceProvider};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Upper bound on numeric suffixes tried when a temp directory name is taken.
pub const MAX_TEMP_DIR_ATTEMPTS: u32 = 1000;

/// Marks a directory as hidden where the platform has such a concept.
pub trait HiddenMarker: Send + Sync + std::fmt::Debug {
    fn mark_hidden(&self, path: &Path) -> io::Result<()>;
}

/// Sets the hidden attribute on Windows; does nothing elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlatformHiddenMarker;

impl HiddenMarker for PlatformHiddenMarker {
    #[cfg(windows)]
    fn mark_hidden(&self, path: &Path) -> io::Result<()> {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::{GetFileAttributesW, SetFileAttributesW, INVALID_FILE_ATTRIBUTES};
        use winapi::um::winnt::FILE_ATTRIBUTE_HIDDEN;

        let wide: Vec<u16> = path.as_os_str().encode_wide().chain(Some(0)).collect();
        // SAFETY: `wide` is a NUL-terminated UTF-16 buffer that outlives both calls.
        unsafe {
            let attrs = GetFileAttributesW(wide.as_ptr());
            if attrs == INVALID_FILE_ATTRIBUTES {
                return Err(io::Error::last_os_error());
            }
            if SetFileAttributesW(wide.as_ptr(), attrs | FILE_ATTRIBUTE_HIDDEN) == 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }

    #[cfg(not(windows))]
    fn mark_hidden(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }
}

/// Make sure `dir` exists as a directory, creating parents as needed.
///
/// Returns `true` if the directory was created by this call.
pub fn ensure_dir(dir: &Path) -> Result<bool, LoaderError> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(false),
        Ok(_) => Err(LoaderError::io(
            dir,
            io::Error::new(
                io::ErrorKind::AlreadyExists,
                "path exists and it does not point to a directory",
            ),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir).map_err(|e| LoaderError::io(dir, e))?;
            Ok(true)
        }
        Err(e) => Err(LoaderError::io(dir, e)),
    }
}

/// Create a fresh directory `base/name`, falling back to `base/name_1`,
/// `base/name_2`, ... when the name is taken.
///
/// Each candidate is claimed by `create_dir` itself, so concurrent callers
/// never end up sharing a directory.
pub fn create_temp_dir(base: &Path, name: &str) -> Result<PathBuf, LoaderError> {
    ensure_dir(base)?;

    for attempt in 0..=MAX_TEMP_DIR_ATTEMPTS {
        let candidate = match attempt {
            0 => base.join(name),
            n => base.join(format!("{name}_{n}")),
        };
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(LoaderError::io(candidate, e)),
        }
    }

    Err(LoaderError::TooManyAttempts(base.join(name)))
}

/// Copy the resource at `resource_path` below `output_dir`, preserving its
/// relative sub-path. An artifact already present at the target is reused.
pub fn extract_resource(
    resources: &dyn ResourceProvider,
    resource_path: &str,
    output_dir: &Path,
) -> Result<PathBuf, LoaderError> {
    let target = output_dir.join(relative(resource_path));
    if target.is_file() {
        debug!(path = %target.display(), "Reusing previously extracted artifact");
        return Ok(target);
    }

    let mut source = resources
        .open(resource_path)?
        .ok_or_else(|| LoaderError::MissingResource(resource_path.to_string()))?;

    let parent = target.parent().unwrap_or(output_dir);
    ensure_dir(parent)?;

    // Stage under a unique name beside the target and rename into place, so
    // neither a crash nor a concurrent extractor leaves a truncated artifact.
    let mut staged = NamedTempFile::new_in(parent).map_err(|e| LoaderError::io(parent, e))?;
    let written = io::copy(&mut source, &mut staged)
        .and_then(|n| staged.as_file().sync_all().map(|()| n))
        .map_err(|e| LoaderError::io(staged.path(), e))?;
    staged
        .persist(&target)
        .map_err(|e| LoaderError::io(&target, e.error))?;

    debug!(path = %target.display(), bytes = written, "Extracted native artifact");
    Ok(target)
}

static PENDING_REMOVALS: Lazy<Mutex<Vec<PathBuf>>> = Lazy::new(|| Mutex::new(Vec::new()));
static EXIT_HOOK: Once = Once::new();

/// Delete `dir` and its contents when the process exits. Failures are logged
/// and otherwise ignored.
///
/// Only effective on Unix; Windows keeps loaded DLLs locked until exit, so
/// the directory could not be removed there anyway.
pub fn remove_at_exit(dir: PathBuf) {
    PENDING_REMOVALS.lock().push(dir);

    #[cfg(unix)]
    EXIT_HOOK.call_once(|| {
        // SAFETY: `run_pending_removals` is a plain `extern "C"` function with
        // no arguments, as `atexit` requires.
        let rc = unsafe { libc::atexit(run_pending_removals) };
        if rc != 0 {
            warn!("Could not register exit hook; extracted artifacts will remain on disk");
        }
    });

    #[cfg(not(unix))]
    EXIT_HOOK.call_once(|| {
        debug!("Temporary artifact directories are not removed on this platform");
    });
}

#[cfg(unix)]
extern "C" fn run_pending_removals() {
    remove_pending(&PENDING_REMOVALS);
}

/// Remove every queued directory. Returns `false` without touching the list
/// when another thread holds it, since blocking at exit could hang the process.
#[cfg(any(unix, test))]
fn remove_pending(pending: &Mutex<Vec<PathBuf>>) -> bool {
    let Some(mut pending) = pending.try_lock() else {
        return false;
    };
    for dir in pending.drain(..) {
        if let Err(e) = fs::remove_dir_all(&dir) {
            warn!(path = %dir.display(), error = %e, "Failed to remove artifact directory");
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::resources::{DirectoryResources, EmbeddedResources};

    static ENTRIES: &[(&str, &[u8])] = &[("/native/sub/lib.so", b"payload")];

    #[test]
    fn test_ensure_dir_creates_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("a/b/c");
        assert!(ensure_dir(&dir).unwrap());
        assert!(!ensure_dir(&dir).unwrap());
        assert!(dir.is_dir());
    }

    #[test]
    fn test_ensure_dir_rejects_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("occupied");
        fs::write(&file, b"x").unwrap();

        let err = ensure_dir(&file).unwrap_err();
        assert!(matches!(err, LoaderError::Io { .. }));
    }

    #[test]
    fn test_temp_dir_suffixes() {
        let tmp = tempfile::tempdir().unwrap();
        let first = create_temp_dir(tmp.path(), "run").unwrap();
        let second = create_temp_dir(tmp.path(), "run").unwrap();
        let third = create_temp_dir(tmp.path(), "run").unwrap();

        assert_eq!(first, tmp.path().join("run"));
        assert_eq!(second, tmp.path().join("run_1"));
        assert_eq!(third, tmp.path().join("run_2"));
    }

    #[test]
    fn test_temp_dir_concurrent_callers_get_distinct_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("shared");
        let barrier = std::sync::Barrier::new(8);

        let mut dirs: Vec<PathBuf> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        create_temp_dir(&base, "run").unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        dirs.sort();
        dirs.dedup();
        assert_eq!(dirs.len(), 8);
        assert!(dirs.iter().all(|d| d.is_dir()));
    }

    #[test]
    fn test_temp_dir_skips_name_taken_by_file() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("run"), b"x").unwrap();

        let dir = create_temp_dir(tmp.path(), "run").unwrap();
        assert_eq!(dir, tmp.path().join("run_1"));
    }

    #[test]
    fn test_extract_preserves_subpath() {
        let tmp = tempfile::tempdir().unwrap();
        let resources = EmbeddedResources::new(ENTRIES);

        let path = extract_resource(&resources, "/native/sub/lib.so", tmp.path()).unwrap();
        assert_eq!(path, tmp.path().join("native/sub/lib.so"));
        assert_eq!(fs::read(&path).unwrap(), b"payload");

        let left: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(left, vec![std::ffi::OsString::from("lib.so")]);
    }

    #[test]
    fn test_concurrent_extractors_leave_one_complete_file() {
        let tmp = tempfile::tempdir().unwrap();
        let resources = EmbeddedResources::new(ENTRIES);
        let barrier = std::sync::Barrier::new(6);

        std::thread::scope(|s| {
            for _ in 0..6 {
                s.spawn(|| {
                    barrier.wait();
                    extract_resource(&resources, "/native/sub/lib.so", tmp.path()).unwrap()
                });
            }
        });

        let dir = tmp.path().join("native/sub");
        assert_eq!(fs::read(dir.join("lib.so")).unwrap(), b"payload");
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);
    }

    #[test]
    fn test_extract_skips_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let existing = tmp.path().join("native/sub/lib.so");
        fs::create_dir_all(existing.parent().unwrap()).unwrap();
        fs::write(&existing, b"old").unwrap();

        let resources = EmbeddedResources::new(ENTRIES);
        extract_resource(&resources, "/native/sub/lib.so", tmp.path()).unwrap();
        assert_eq!(fs::read(&existing).unwrap(), b"old");
    }

    #[test]
    fn test_extract_missing_resource() {
        let tmp = tempfile::tempdir().unwrap();
        let resources = DirectoryResources::new(tmp.path().join("empty"));

        let err = extract_resource(&resources, "/native/ghost.so", tmp.path()).unwrap_err();
        assert!(matches!(err, LoaderError::MissingResource(ref p) if p == "/native/ghost.so"));
    }

    #[test]
    fn test_pending_removals_skip_when_list_is_held() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("artifacts");
        fs::create_dir(&dir).unwrap();
        let pending = Mutex::new(vec![dir.clone()]);

        let guard = pending.lock();
        assert!(!remove_pending(&pending));
        drop(guard);
        assert!(dir.is_dir());

        assert!(remove_pending(&pending));
        assert!(!dir.exists());
        assert!(pending.lock().is_empty());
    }

    #[test]
    fn test_platform_marker_accepts_directory() {
        let tmp = tempfile::tempdir().unwrap();
        PlatformHiddenMarker.mark_hidden(tmp.path()).unwrap();
    }
}
