//! Shared test utilities.
//!
//! - Mock bridge and port creation
//! - Waiting helpers for cross-thread assertions
//! - A linker that records calls instead of loading code

#![allow(dead_code)]

use native_serial::loader::{LoaderError, Linker};
use native_serial::native::MockBridge;
use native_serial::port::SerialPort;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Device name used by the end-to-end scenarios.
pub const TEST_PORT: &str = "COM-TEST";

/// How long a blocked thread is given to prove it is really blocked.
pub const SETTLE: Duration = Duration::from_millis(150);

/// Upper bound for anything expected to happen "soon".
pub const PATIENCE: Duration = Duration::from_secs(5);

/// A bridge with one registered device and a port opened on it.
pub fn open_mock_port(name: &str) -> (MockBridge, SerialPort) {
    let bridge = MockBridge::new().with_device(name);
    let port = SerialPort::open_with(Arc::new(bridge.clone()), name)
        .expect("Failed to open mock port");
    (bridge, port)
}

/// Spin until `cond` holds, panicking after [`PATIENCE`].
pub fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + PATIENCE;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Linker whose "library" is the artifact's content as text.
///
/// Lets tests ship a version string as the artifact and check it like a
/// real library would report its own version.
#[derive(Debug, Default, Clone)]
pub struct TextLinker {
    pub calls: Arc<AtomicUsize>,
}

impl TextLinker {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Linker for TextLinker {
    type Library = String;

    fn link(&self, path: &Path) -> Result<String, LoaderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Widen the window in which concurrent callers could double-link.
        thread::sleep(Duration::from_millis(20));
        std::fs::read_to_string(path).map_err(|e| LoaderError::Link {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}
