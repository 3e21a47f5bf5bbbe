//! Native library loader.
//!
//! A [`NativeLibLoader`] holds a registry of bundled artifacts per host key.
//! [`NativeLibLoader::initialize`] runs once: it resolves the host, extracts
//! every artifact registered for it, links each into the process and runs an
//! optional compatibility check. Registration is rejected once initialization
//! has begun, and repeated initialization is a no-op.
//!
//! A library rejected by the compatibility check has already been mapped into
//! the process. It is kept mapped (and unused) rather than unloaded, since
//! shared libraries cannot be reliably unloaded on common platforms.

mod error;
mod extract;
mod linker;
mod resources;

pub use error::LoaderError;
pub use extract::{
    create_temp_dir, ensure_dir, extract_resource, remove_at_exit, HiddenMarker,
    PlatformHiddenMarker, MAX_TEMP_DIR_ATTEMPTS,
};
pub use linker::{DynamicLinker, Linker};
pub use resources::{DirectoryResources, EmbeddedResources, ResourceProvider};

use crate::host::HostKey;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where extracted artifacts are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractTarget {
    /// A fixed directory reused across runs.
    Directory(PathBuf),
    /// A fresh directory `base/name[_N]` removed when the process exits.
    TempDir { base: PathBuf, name: String },
}

impl ExtractTarget {
    /// Run-scoped directory under the system temp dir.
    pub fn temp(name: impl Into<String>) -> Self {
        Self::TempDir {
            base: std::env::temp_dir(),
            name: name.into(),
        }
    }
}

/// Arguments handed to a compatibility check.
pub struct CheckContext<'a, Lib> {
    pub host: &'a HostKey,
    pub path: &'a Path,
    pub library: &'a Lib,
}

/// Decides whether a freshly linked library may be used.
pub type CompatibilityCheck<Lib> = dyn Fn(&CheckContext<'_, Lib>) -> bool + Send + Sync;

/// An artifact that was extracted, linked and accepted.
pub struct LoadedLibrary<Lib> {
    pub host: HostKey,
    pub path: PathBuf,
    pub library: Arc<Lib>,
}

impl<Lib> Clone for LoadedLibrary<Lib> {
    fn clone(&self) -> Self {
        Self {
            host: self.host,
            path: self.path.clone(),
            library: Arc::clone(&self.library),
        }
    }
}

impl<Lib> fmt::Debug for LoadedLibrary<Lib> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedLibrary")
            .field("host", &self.host)
            .field("path", &self.path)
            .finish()
    }
}

/// Lifecycle of a loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderPhase {
    Uninitialized,
    Initializing,
    Ready,
    Failed(String),
}

struct LoaderState<Lib> {
    registry: HashMap<String, Vec<String>>,
    phase: LoaderPhase,
    loaded: Vec<LoadedLibrary<Lib>>,
    /// Libraries that linked but failed the check. Dropping them would unload.
    retained: Vec<Arc<Lib>>,
    output_dir: Option<PathBuf>,
    /// Error of the failed initialization, handed to every later caller.
    failure: Option<LoaderError>,
}

/// One-time extraction and loading of bundled native libraries.
pub struct NativeLibLoader<L: Linker = DynamicLinker> {
    resources: Box<dyn ResourceProvider>,
    target: ExtractTarget,
    linker: L,
    check: Option<Box<CompatibilityCheck<L::Library>>>,
    marker: Box<dyn HiddenMarker>,
    host: Option<HostKey>,
    state: Mutex<LoaderState<L::Library>>,
}

impl NativeLibLoader<DynamicLinker> {
    /// Loader using the platform dynamic linker.
    pub fn new(resources: impl ResourceProvider + 'static, target: ExtractTarget) -> Self {
        Self::with_linker(resources, target, DynamicLinker)
    }
}

impl<L: Linker> NativeLibLoader<L> {
    pub fn with_linker(
        resources: impl ResourceProvider + 'static,
        target: ExtractTarget,
        linker: L,
    ) -> Self {
        Self {
            resources: Box::new(resources),
            target,
            linker,
            check: None,
            marker: Box::new(PlatformHiddenMarker),
            host: None,
            state: Mutex::new(LoaderState {
                registry: HashMap::new(),
                phase: LoaderPhase::Uninitialized,
                loaded: Vec::new(),
                retained: Vec::new(),
                output_dir: None,
                failure: None,
            }),
        }
    }

    /// Install a check run against every linked library before it is accepted.
    pub fn with_compatibility_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&CheckContext<'_, L::Library>) -> bool + Send + Sync + 'static,
    {
        self.check = Some(Box::new(check));
        self
    }

    /// Use a fixed host key instead of resolving the running platform.
    pub fn with_host(mut self, host: HostKey) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_hidden_marker(mut self, marker: impl HiddenMarker + 'static) -> Self {
        self.marker = Box::new(marker);
        self
    }

    /// Register `artifact_path` for `host`. Chainable.
    ///
    /// Fails once initialization has started, on empty arguments, on paths
    /// escaping the resource root, and on a duplicate (host, path) pair.
    pub fn register(&self, host: &str, artifact_path: &str) -> Result<&Self, LoaderError> {
        let mut state = self.state.lock();
        if state.phase != LoaderPhase::Uninitialized {
            return Err(LoaderError::AlreadyInitialized);
        }

        if host.is_empty() {
            return Err(LoaderError::invalid("host cannot be empty"));
        }
        if artifact_path.is_empty() {
            return Err(LoaderError::invalid("empty embedded library path"));
        }
        if Path::new(artifact_path)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(LoaderError::invalid(format!(
                "embedded library path escapes resource root: {artifact_path}"
            )));
        }

        let paths = state.registry.entry(host.to_string()).or_default();
        if paths.iter().any(|p| p == artifact_path) {
            return Err(LoaderError::DuplicateRegistration {
                host: host.to_string(),
                path: artifact_path.to_string(),
            });
        }
        paths.push(artifact_path.to_string());

        debug!(host, path = artifact_path, "Registered native artifact");
        Ok(self)
    }

    /// Extract, link and check the artifacts registered for this host.
    ///
    /// Safe to call from many threads: the first caller does the work while
    /// holding the loader lock, later callers return immediately. A failure
    /// is sticky: every later caller gets the same error again.
    pub fn initialize(&self) -> Result<(), LoaderError> {
        let mut state = self.state.lock();
        match &state.phase {
            LoaderPhase::Ready => return Ok(()),
            LoaderPhase::Failed(_) => {
                if let Some(failure) = &state.failure {
                    return Err(failure.clone());
                }
            }
            LoaderPhase::Uninitialized | LoaderPhase::Initializing => {}
        }

        state.phase = LoaderPhase::Initializing;
        match self.run(&mut state) {
            Ok(()) => {
                state.phase = LoaderPhase::Ready;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Native library initialization failed");
                state.phase = LoaderPhase::Failed(e.to_string());
                state.failure = Some(e.clone());
                Err(e)
            }
        }
    }

    fn run(&self, state: &mut LoaderState<L::Library>) -> Result<(), LoaderError> {
        let host = match self.host {
            Some(host) => host,
            None => HostKey::resolve()?,
        };

        let paths = match state.registry.get(&host.to_string()) {
            Some(paths) if !paths.is_empty() => paths.clone(),
            _ => {
                info!(%host, "No native artifacts registered for host; loader is inert");
                return Ok(());
            }
        };

        let output_dir = self.prepare_output_dir()?;
        if let Err(e) = self.marker.mark_hidden(&output_dir) {
            debug!(path = %output_dir.display(), error = %e, "Could not hide output directory");
        }
        state.output_dir = Some(output_dir.clone());

        for artifact in &paths {
            let path = extract_resource(self.resources.as_ref(), artifact, &output_dir)?;
            let library = Arc::new(self.linker.link(&path)?);

            if let Some(check) = &self.check {
                let ctx = CheckContext {
                    host: &host,
                    path: &path,
                    library: library.as_ref(),
                };
                if !check(&ctx) {
                    warn!(%host, path = %path.display(), "Rejected incompatible native library");
                    state.retained.push(library);
                    return Err(LoaderError::Incompatible {
                        host: host.to_string(),
                        path,
                    });
                }
            }

            info!(%host, path = %path.display(), "Loaded native library");
            state.loaded.push(LoadedLibrary {
                host,
                path,
                library,
            });
        }

        Ok(())
    }

    fn prepare_output_dir(&self) -> Result<PathBuf, LoaderError> {
        match &self.target {
            ExtractTarget::Directory(dir) => {
                ensure_dir(dir)?;
                Ok(dir.clone())
            }
            ExtractTarget::TempDir { base, name } => {
                ensure_dir(base)?;
                let dir = create_temp_dir(base, name)?;
                remove_at_exit(dir.clone());
                Ok(dir)
            }
        }
    }

    pub fn phase(&self) -> LoaderPhase {
        self.state.lock().phase.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.phase() == LoaderPhase::Ready
    }

    /// Libraries accepted during initialization, in registration order.
    pub fn libraries(&self) -> Vec<LoadedLibrary<L::Library>> {
        self.state.lock().loaded.clone()
    }

    /// Directory artifacts were extracted to, once initialized.
    pub fn output_dir(&self) -> Option<PathBuf> {
        self.state.lock().output_dir.clone()
    }

    /// Artifact paths registered for `host`, in registration order.
    pub fn registered(&self, host: &str) -> Vec<String> {
        self.state
            .lock()
            .registry
            .get(host)
            .cloned()
            .unwrap_or_default()
    }
}

impl<L: Linker> fmt::Debug for NativeLibLoader<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("NativeLibLoader")
            .field("target", &self.target)
            .field("phase", &state.phase)
            .field("loaded", &state.loaded.len())
            .field("retained", &state.retained.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostArch, HostOs};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HOST: HostKey = HostKey::new(HostOs::Linux, HostArch::X64);
    static ENTRIES: &[(&str, &[u8])] = &[
        ("/native/first.so", b"first"),
        ("/native/second.so", b"second"),
    ];

    #[derive(Default)]
    struct PathLinker {
        calls: Arc<AtomicUsize>,
    }

    impl Linker for PathLinker {
        type Library = PathBuf;

        fn link(&self, path: &Path) -> Result<PathBuf, LoaderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(path.to_path_buf())
        }
    }

    fn loader(dir: &Path) -> NativeLibLoader<PathLinker> {
        NativeLibLoader::with_linker(
            EmbeddedResources::new(ENTRIES),
            ExtractTarget::Directory(dir.to_path_buf()),
            PathLinker::default(),
        )
        .with_host(HOST)
    }

    #[test]
    fn test_register_rejects_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = loader(tmp.path());
        assert!(matches!(
            loader.register("", "/native/first.so"),
            Err(LoaderError::InvalidRegistration(_))
        ));
        assert!(matches!(
            loader.register("linux-x64", ""),
            Err(LoaderError::InvalidRegistration(_))
        ));
        assert!(matches!(
            loader.register("linux-x64", "/native/../etc/passwd"),
            Err(LoaderError::InvalidRegistration(_))
        ));
    }

    #[test]
    fn test_register_duplicate() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = loader(tmp.path());
        loader.register("linux-x64", "/native/first.so").unwrap();
        let err = loader
            .register("linux-x64", "/native/first.so")
            .unwrap_err();
        assert!(matches!(err, LoaderError::DuplicateRegistration { .. }));

        // Same path for another host is fine.
        loader.register("windows-x64", "/native/first.so").unwrap();
    }

    #[test]
    fn test_registration_order_is_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = loader(tmp.path());
        loader
            .register("linux-x64", "/native/second.so")
            .and_then(|l| l.register("linux-x64", "/native/first.so"))
            .unwrap();
        loader.initialize().unwrap();

        let names: Vec<_> = loader
            .libraries()
            .iter()
            .map(|l| l.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["second.so", "first.so"]);
    }

    #[test]
    fn test_register_after_initialize() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = loader(tmp.path());
        loader.initialize().unwrap();
        assert!(matches!(
            loader.register("linux-x64", "/native/first.so"),
            Err(LoaderError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_inert_without_artifacts_for_host() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = loader(tmp.path());
        loader.register("windows-x64", "/native/first.so").unwrap();
        loader.initialize().unwrap();

        assert!(loader.is_initialized());
        assert!(loader.libraries().is_empty());
        assert!(loader.output_dir().is_none());
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let linker = PathLinker::default();
        let calls = Arc::clone(&linker.calls);
        let loader = NativeLibLoader::with_linker(
            EmbeddedResources::new(ENTRIES),
            ExtractTarget::Directory(tmp.path().to_path_buf()),
            linker,
        )
        .with_host(HOST);
        loader.register("linux-x64", "/native/first.so").unwrap();

        loader.initialize().unwrap();
        loader.initialize().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            std::fs::read(tmp.path().join("native/first.so")).unwrap(),
            b"first"
        );
    }

    #[test]
    fn test_incompatible_library_is_sticky() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = loader(tmp.path()).with_compatibility_check(|ctx| {
            ctx.library.ends_with("first.so") && ctx.host.to_string() == "linux-x64"
        });
        loader
            .register("linux-x64", "/native/first.so")
            .and_then(|l| l.register("linux-x64", "/native/second.so"))
            .unwrap();

        let err = loader.initialize().unwrap_err();
        assert!(matches!(
            err,
            LoaderError::Incompatible { ref path, .. } if path.ends_with("second.so")
        ));
        assert!(matches!(loader.phase(), LoaderPhase::Failed(_)));
        assert!(matches!(
            loader.initialize(),
            Err(LoaderError::Incompatible { ref path, .. }) if path.ends_with("second.so")
        ));
        assert!(!loader.is_initialized());
    }

    #[test]
    fn test_missing_resource_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = loader(tmp.path());
        loader.register("linux-x64", "/native/absent.so").unwrap();
        assert!(matches!(
            loader.initialize(),
            Err(LoaderError::MissingResource(_))
        ));
    }

    #[test]
    fn test_temp_target_creates_fresh_dir() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("run")).unwrap();

        let loader = NativeLibLoader::with_linker(
            EmbeddedResources::new(ENTRIES),
            ExtractTarget::TempDir {
                base: tmp.path().to_path_buf(),
                name: "run".to_string(),
            },
            PathLinker::default(),
        )
        .with_host(HOST);
        loader.register("linux-x64", "/native/first.so").unwrap();
        loader.initialize().unwrap();

        assert_eq!(loader.output_dir(), Some(tmp.path().join("run_1")));
        assert!(tmp.path().join("run_1/native/first.so").is_file());
    }
}
