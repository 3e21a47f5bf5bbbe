//! Bridge over a dynamically loaded driver library.
//!
//! The library exports a flat C ABI (`native_serial_*`). Boolean results use
//! non-zero for success.

use super::{NativeBridge, NativeHandle, CLOSED_HANDLE};
use crate::loader::LoaderError;
use libloading::Library;
use std::ffi::{c_char, c_int, CStr, CString};
use std::fmt;
use std::sync::Arc;

type VersionFn = unsafe extern "C" fn() -> *const c_char;
type ListPortsFn = unsafe extern "C" fn(*mut u8, usize) -> i64;
type GetErrorFn = unsafe extern "C" fn() -> c_int;
type ClearErrorFn = unsafe extern "C" fn();
type OpenFn = unsafe extern "C" fn(*const c_char) -> i64;
type HandleFn = unsafe extern "C" fn(i64) -> c_int;
type ConfigFn = unsafe extern "C" fn(i64, c_int, c_int, c_int, c_int) -> c_int;
type PurgeFn = unsafe extern "C" fn(i64, c_int) -> c_int;
type SetTimeoutFn = unsafe extern "C" fn(i64, i64) -> c_int;
type GetTimeoutFn = unsafe extern "C" fn(i64) -> i64;
type ReadFn = unsafe extern "C" fn(i64, *mut u8, c_int) -> c_int;
type WriteFn = unsafe extern "C" fn(i64, *const u8, c_int) -> c_int;

const VERSION_SYMBOL: &[u8] = b"native_serial_version\0";

/// Resolve `name` and copy out the function pointer.
///
/// # Safety
/// `T` must match the exported symbol's real signature, and the pointer may
/// only be called while `library` stays loaded.
unsafe fn symbol<T: Copy>(library: &Library, name: &[u8]) -> Result<T, LoaderError> {
    library
        .get::<T>(name)
        .map(|s| *s)
        .map_err(|e| LoaderError::MissingSymbol {
            symbol: String::from_utf8_lossy(name.strip_suffix(b"\0").unwrap_or(name)).into_owned(),
            message: e.to_string(),
        })
}

/// Query the version string a loaded library reports, if it exports one.
pub fn library_version_of(library: &Library) -> Option<String> {
    // SAFETY: signature matches the exported entry point; the call happens
    // while `library` is borrowed, so it stays loaded.
    unsafe {
        let version: VersionFn = symbol(library, VERSION_SYMBOL).ok()?;
        let ptr = version();
        if ptr.is_null() {
            return None;
        }
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

/// [`NativeBridge`] backed by a loaded driver library.
pub struct DynamicBridge {
    version: VersionFn,
    list_ports: ListPortsFn,
    get_error: GetErrorFn,
    clear_error: ClearErrorFn,
    open: OpenFn,
    close: HandleFn,
    config: ConfigFn,
    purge: PurgeFn,
    get_baud: HandleFn,
    get_data_bits: HandleFn,
    get_parity: HandleFn,
    get_stop_bits: HandleFn,
    set_read_timeout: SetTimeoutFn,
    get_read_timeout: GetTimeoutFn,
    read: ReadFn,
    write: WriteFn,
    flush: HandleFn,
    // Keeps every pointer above valid.
    _library: Arc<Library>,
}

impl DynamicBridge {
    /// Resolve the full call surface from `library`.
    pub fn new(library: Arc<Library>) -> Result<Self, LoaderError> {
        // SAFETY: each type alias mirrors the documented C signature, and the
        // library is kept alive by the bridge for as long as the pointers are.
        unsafe {
            Ok(Self {
                version: symbol(&library, VERSION_SYMBOL)?,
                list_ports: symbol(&library, b"native_serial_list_ports\0")?,
                get_error: symbol(&library, b"native_serial_get_error\0")?,
                clear_error: symbol(&library, b"native_serial_clear_error\0")?,
                open: symbol(&library, b"native_serial_open\0")?,
                close: symbol(&library, b"native_serial_close\0")?,
                config: symbol(&library, b"native_serial_config\0")?,
                purge: symbol(&library, b"native_serial_purge\0")?,
                get_baud: symbol(&library, b"native_serial_get_baud\0")?,
                get_data_bits: symbol(&library, b"native_serial_get_data_bits\0")?,
                get_parity: symbol(&library, b"native_serial_get_parity\0")?,
                get_stop_bits: symbol(&library, b"native_serial_get_stop_bits\0")?,
                set_read_timeout: symbol(&library, b"native_serial_set_read_timeout\0")?,
                get_read_timeout: symbol(&library, b"native_serial_get_read_timeout\0")?,
                read: symbol(&library, b"native_serial_read\0")?,
                write: symbol(&library, b"native_serial_write\0")?,
                flush: symbol(&library, b"native_serial_flush\0")?,
                _library: library,
            })
        }
    }
}

// SAFETY (all calls below): the pointers were resolved from a library this
// bridge keeps loaded, and buffers are passed with their true lengths.
impl NativeBridge for DynamicBridge {
    fn library_version(&self) -> String {
        let ptr = unsafe { (self.version)() };
        if ptr.is_null() {
            return String::new();
        }
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }

    fn port_names(&self) -> Option<Vec<String>> {
        let needed = unsafe { (self.list_ports)(std::ptr::null_mut(), 0) };
        if needed < 0 {
            return None;
        }

        let mut buf = vec![0u8; usize::try_from(needed).ok()?];
        let written = unsafe { (self.list_ports)(buf.as_mut_ptr(), buf.len()) };
        if written < 0 {
            return None;
        }
        buf.truncate(usize::try_from(written).ok()?.min(buf.len()));

        Some(
            buf.split(|b| *b == 0)
                .filter(|name| !name.is_empty())
                .map(|name| String::from_utf8_lossy(name).into_owned())
                .collect(),
        )
    }

    fn last_error(&self) -> i32 {
        unsafe { (self.get_error)() }
    }

    fn clear_last_error(&self) {
        unsafe { (self.clear_error)() }
    }

    fn open(&self, name: &str) -> NativeHandle {
        let Ok(name) = CString::new(name) else {
            return CLOSED_HANDLE;
        };
        unsafe { (self.open)(name.as_ptr()) }
    }

    fn close(&self, handle: NativeHandle) -> bool {
        unsafe { (self.close)(handle) != 0 }
    }

    fn configure(
        &self,
        handle: NativeHandle,
        baud: i32,
        data_bits: i32,
        parity: i32,
        stop_bits: i32,
    ) -> bool {
        unsafe { (self.config)(handle, baud, data_bits, parity, stop_bits) != 0 }
    }

    fn purge(&self, handle: NativeHandle, kind: i32) -> bool {
        unsafe { (self.purge)(handle, kind) != 0 }
    }

    fn baud(&self, handle: NativeHandle) -> i32 {
        unsafe { (self.get_baud)(handle) }
    }

    fn data_bits(&self, handle: NativeHandle) -> i32 {
        unsafe { (self.get_data_bits)(handle) }
    }

    fn parity(&self, handle: NativeHandle) -> i32 {
        unsafe { (self.get_parity)(handle) }
    }

    fn stop_bits(&self, handle: NativeHandle) -> i32 {
        unsafe { (self.get_stop_bits)(handle) }
    }

    fn set_read_timeout(&self, handle: NativeHandle, millis: i64) -> bool {
        unsafe { (self.set_read_timeout)(handle, millis) != 0 }
    }

    fn read_timeout(&self, handle: NativeHandle) -> i64 {
        unsafe { (self.get_read_timeout)(handle) }
    }

    fn read(&self, handle: NativeHandle, buf: &mut [u8]) -> i32 {
        let len = buf.len().min(c_int::MAX as usize) as c_int;
        unsafe { (self.read)(handle, buf.as_mut_ptr(), len) }
    }

    fn write(&self, handle: NativeHandle, buf: &[u8]) -> bool {
        buf.chunks(c_int::MAX as usize).all(|chunk| unsafe {
            (self.write)(handle, chunk.as_ptr(), chunk.len() as c_int) != 0
        })
    }

    fn flush(&self, handle: NativeHandle) -> bool {
        unsafe { (self.flush)(handle) != 0 }
    }
}

impl fmt::Debug for DynamicBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicBridge")
            .field("version", &self.library_version())
            .finish()
    }
}
