//! Native bridge: the flat call surface between port handles and a driver.
//!
//! Every entry point takes primitive values and byte buffers only. Failures
//! are signalled in-band (`false`, a negative count, or [`CLOSED_HANDLE`]) and
//! the reason is recovered from [`NativeBridge::last_error`], which must be
//! queried and cleared on the same thread before any other native call.
//!
//! A process-wide default bridge is built on first use by [`init`] or
//! [`bridge`]; [`install`] lets embedders supply their own.

pub mod dynamic;
pub mod error;
pub mod mock;
pub mod serialport_backend;

pub use dynamic::{library_version_of, DynamicBridge};
pub use error::{map_code, take_code, take_error};
pub use mock::{MockBridge, MockOp};
pub use serialport_backend::SerialportBridge;

use crate::config::{Backend, ConfigLoader, NativeConfig};
use crate::host::HostKey;
use crate::loader::{
    DirectoryResources, EmbeddedResources, ExtractTarget, LoaderError, NativeLibLoader,
    ResourceProvider,
};
use crate::port::PortError;
use crate::version::SemanticVersion;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Opaque identifier of an open device session inside the driver.
pub type NativeHandle = i64;

/// Handle value meaning "no open session".
pub const CLOSED_HANDLE: NativeHandle = -1;

/// Error codes reported through [`NativeBridge::last_error`].
pub mod codes {
    pub const NONE: i32 = 0;
    pub const INVALID_PARAM: i32 = -2;
    pub const IO: i32 = -3;
    pub const ACCESS: i32 = -4;
    pub const TIMEOUT: i32 = -7;
    pub const EOF: i32 = -8;
}

/// Flat native call surface.
///
/// Attribute codes follow the tables in [`crate::port`] (`DataBits`,
/// `Parity`, `StopBits`, `PurgeType`).
pub trait NativeBridge: Send + Sync + fmt::Debug {
    /// Self-reported version of the driver, `major.minor.patch[-extra]`.
    fn library_version(&self) -> String;

    /// Names of the serial devices present, or `None` on failure.
    fn port_names(&self) -> Option<Vec<String>>;

    fn last_error(&self) -> i32;
    fn clear_last_error(&self);

    /// Open a device; [`CLOSED_HANDLE`] on failure.
    fn open(&self, name: &str) -> NativeHandle;
    fn close(&self, handle: NativeHandle) -> bool;

    fn configure(
        &self,
        handle: NativeHandle,
        baud: i32,
        data_bits: i32,
        parity: i32,
        stop_bits: i32,
    ) -> bool;
    fn purge(&self, handle: NativeHandle, kind: i32) -> bool;

    /// Attribute getters return a negative value on failure.
    fn baud(&self, handle: NativeHandle) -> i32;
    fn data_bits(&self, handle: NativeHandle) -> i32;
    fn parity(&self, handle: NativeHandle) -> i32;
    fn stop_bits(&self, handle: NativeHandle) -> i32;

    fn set_read_timeout(&self, handle: NativeHandle, millis: i64) -> bool;
    fn read_timeout(&self, handle: NativeHandle) -> i64;

    /// Bytes read (`>= 0`) or `-1`; on `-1` the last error is
    /// [`codes::TIMEOUT`], [`codes::EOF`] or a failure code.
    fn read(&self, handle: NativeHandle, buf: &mut [u8]) -> i32;
    /// Write the whole buffer.
    fn write(&self, handle: NativeHandle, buf: &[u8]) -> bool;
    fn flush(&self, handle: NativeHandle) -> bool;
}

/// Default artifacts shipped with the crate, by host key.
pub const DEFAULT_ARTIFACTS: &[(&str, &str)] = &[
    ("linux-x64", "/native/libnative_serial-x64.so"),
    ("linux-x86", "/native/libnative_serial-x86.so"),
    ("windows-x64", "/native/native_serial-x64.dll"),
    ("windows-x86", "/native/native_serial-x86.dll"),
];

/// Artifacts compiled into this build. Empty unless a packaging step fills it.
pub static EMBEDDED_ARTIFACTS: EmbeddedResources = EmbeddedResources::empty();

static BRIDGE: OnceCell<Arc<dyn NativeBridge>> = OnceCell::new();
static LOADER: OnceCell<NativeLibLoader> = OnceCell::new();

/// Install `bridge` as the process-wide default.
///
/// Returns the rejected bridge if a default is already in place.
pub fn install(bridge: Arc<dyn NativeBridge>) -> Result<(), Arc<dyn NativeBridge>> {
    BRIDGE.set(bridge)
}

/// Build the process-wide default bridge from `config`. Later calls return
/// the bridge built by the first successful one.
pub fn init(config: &NativeConfig) -> Result<Arc<dyn NativeBridge>, PortError> {
    BRIDGE
        .get_or_try_init(|| build_bridge(config))
        .map(Arc::clone)
}

/// The process-wide default bridge, initialized from the loaded configuration
/// on first use.
pub fn bridge() -> Result<Arc<dyn NativeBridge>, PortError> {
    if let Some(bridge) = BRIDGE.get() {
        return Ok(Arc::clone(bridge));
    }

    let config = match ConfigLoader::load() {
        Ok(loader) => loader.into_config(),
        Err(e) => {
            warn!(error = %e, "Failed to load configuration, using defaults");
            ConfigLoader::with_defaults().into_config()
        }
    };
    init(&config.native)
}

/// Version reported by the default bridge.
pub fn library_version() -> Result<String, PortError> {
    Ok(bridge()?.library_version())
}

/// Serial devices visible to the default bridge.
pub fn port_names() -> Result<Vec<String>, PortError> {
    let bridge = bridge()?;
    match bridge.port_names() {
        Some(names) => Ok(names),
        None => Err(take_error(bridge.as_ref())),
    }
}

fn build_bridge(config: &NativeConfig) -> Result<Arc<dyn NativeBridge>, PortError> {
    match config.backend {
        Backend::Serialport => {
            info!("Using serialport backend");
            Ok(Arc::new(SerialportBridge::new(Duration::from_millis(
                config.default_read_timeout_ms,
            ))))
        }
        Backend::Library => build_library_bridge(config),
    }
}

fn build_library_bridge(config: &NativeConfig) -> Result<Arc<dyn NativeBridge>, PortError> {
    let min = version_bound("native.min_version", &config.min_version)?;
    let max = version_bound("native.max_version", &config.max_version)?;

    let loader = LOADER.get_or_try_init(|| -> Result<NativeLibLoader, LoaderError> {
        let resources: Box<dyn ResourceProvider> = match &config.resource_dir {
            Some(dir) => Box::new(DirectoryResources::new(dir)),
            None => Box::new(EMBEDDED_ARTIFACTS),
        };
        let target = match &config.temp_dir_name {
            Some(name) => ExtractTarget::temp(name.clone()),
            None => ExtractTarget::Directory(config.resolved_base_dir()),
        };

        let loader = NativeLibLoader::new(resources, target).with_compatibility_check(
            move |ctx| match library_version_of(ctx.library)
                .and_then(|v| v.parse::<SemanticVersion>().ok())
            {
                Some(version) => {
                    let accepted = version.is_within(&min, &max);
                    if !accepted {
                        warn!(%version, %min, %max, "Native library version out of range");
                    }
                    accepted
                }
                None => false,
            },
        );
        for (host, path) in DEFAULT_ARTIFACTS {
            loader.register(host, path)?;
        }
        Ok(loader)
    })?;

    loader.initialize()?;

    match loader.libraries().into_iter().next() {
        Some(loaded) => {
            let bridge = DynamicBridge::new(loaded.library)?;
            info!(version = %bridge.library_version(), "Using native library backend");
            Ok(Arc::new(bridge))
        }
        None => {
            let host = HostKey::resolve()?;
            warn!(%host, "No native library for this host; serial calls will fail");
            Ok(Arc::new(UnavailableBridge))
        }
    }
}

fn version_bound(key: &str, value: &str) -> Result<SemanticVersion, LoaderError> {
    value.parse().map_err(|e: crate::version::VersionError| LoaderError::InvalidVersion {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Stand-in used when no artifact exists for the host. Every call fails with
/// [`codes::IO`].
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableBridge;

impl NativeBridge for UnavailableBridge {
    fn library_version(&self) -> String {
        "0.0.0-unavailable".to_string()
    }

    fn port_names(&self) -> Option<Vec<String>> {
        None
    }

    fn last_error(&self) -> i32 {
        codes::IO
    }

    fn clear_last_error(&self) {}

    fn open(&self, _name: &str) -> NativeHandle {
        CLOSED_HANDLE
    }

    fn close(&self, _handle: NativeHandle) -> bool {
        false
    }

    fn configure(&self, _: NativeHandle, _: i32, _: i32, _: i32, _: i32) -> bool {
        false
    }

    fn purge(&self, _handle: NativeHandle, _kind: i32) -> bool {
        false
    }

    fn baud(&self, _handle: NativeHandle) -> i32 {
        -1
    }

    fn data_bits(&self, _handle: NativeHandle) -> i32 {
        -1
    }

    fn parity(&self, _handle: NativeHandle) -> i32 {
        -1
    }

    fn stop_bits(&self, _handle: NativeHandle) -> i32 {
        -1
    }

    fn set_read_timeout(&self, _handle: NativeHandle, _millis: i64) -> bool {
        false
    }

    fn read_timeout(&self, _handle: NativeHandle) -> i64 {
        -1
    }

    fn read(&self, _handle: NativeHandle, _buf: &mut [u8]) -> i32 {
        -1
    }

    fn write(&self, _handle: NativeHandle, _buf: &[u8]) -> bool {
        false
    }

    fn flush(&self, _handle: NativeHandle) -> bool {
        false
    }
}
