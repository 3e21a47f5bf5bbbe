//! Bridge backed by the `serialport` crate.
//!
//! Emulates the flat native surface in-process: handles index a table of
//! open ports, and the last error lives in a thread-local, like `errno`.
//! Each handle keeps two clones of the device so one read and one write
//! can be in flight at the same time.

use super::{codes, NativeBridge, NativeHandle, CLOSED_HANDLE};
use crate::port::{DataBits, Parity, PurgeType, StopBits};
use parking_lot::{Mutex, RwLock};
use std::cell::Cell;
use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

thread_local! {
    static LAST_ERROR: Cell<i32> = const { Cell::new(codes::NONE) };
}

fn fail(code: i32) {
    LAST_ERROR.with(|e| e.set(code));
}

fn io_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => codes::TIMEOUT,
        ErrorKind::PermissionDenied => codes::ACCESS,
        ErrorKind::InvalidInput => codes::INVALID_PARAM,
        _ => codes::IO,
    }
}

fn serial_code(err: &serialport::Error) -> i32 {
    match err.kind() {
        serialport::ErrorKind::Io(kind) => io_code(kind),
        serialport::ErrorKind::InvalidInput => codes::INVALID_PARAM,
        serialport::ErrorKind::NoDevice | serialport::ErrorKind::Unknown => codes::IO,
    }
}

/// The four attributes `configure` changes together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineSettings {
    baud: u32,
    data_bits: serialport::DataBits,
    parity: serialport::Parity,
    stop_bits: serialport::StopBits,
}

impl LineSettings {
    fn read_from(dev: &dyn serialport::SerialPort) -> serialport::Result<Self> {
        Ok(Self {
            baud: dev.baud_rate()?,
            data_bits: dev.data_bits()?,
            parity: dev.parity()?,
            stop_bits: dev.stop_bits()?,
        })
    }

    fn write_to(self, dev: &mut dyn serialport::SerialPort) -> serialport::Result<()> {
        dev.set_baud_rate(self.baud)?;
        dev.set_data_bits(self.data_bits)?;
        dev.set_parity(self.parity)?;
        dev.set_stop_bits(self.stop_bits)
    }
}

/// Apply all four settings or none: on a failed setter the previous values
/// are written back before the error is returned.
fn apply_line_settings(
    dev: &mut dyn serialport::SerialPort,
    line: LineSettings,
) -> serialport::Result<()> {
    let previous = LineSettings::read_from(dev)?;
    let Err(e) = line.write_to(dev) else {
        return Ok(());
    };
    if let Err(restore) = previous.write_to(dev) {
        warn!(error = %restore, "Could not restore line settings after failed configure");
    }
    Err(e)
}

struct OpenPort {
    reader: Mutex<Box<dyn serialport::SerialPort>>,
    writer: Mutex<Box<dyn serialport::SerialPort>>,
}

/// [`NativeBridge`] over the operating system's serial devices.
#[derive(Debug)]
pub struct SerialportBridge {
    default_timeout: Duration,
    next_handle: AtomicI64,
    ports: RwLock<HashMap<NativeHandle, Arc<OpenPort>>>,
}

impl std::fmt::Debug for OpenPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenPort")
            .field("name", &self.writer.try_lock().and_then(|p| p.name()))
            .finish()
    }
}

impl SerialportBridge {
    /// Ports open with 9600 8N1 and `default_timeout` as read timeout.
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            default_timeout,
            next_handle: AtomicI64::new(1),
            ports: RwLock::new(HashMap::new()),
        }
    }

    fn port(&self, handle: NativeHandle) -> Option<Arc<OpenPort>> {
        let port = self.ports.read().get(&handle).cloned();
        if port.is_none() {
            fail(codes::INVALID_PARAM);
        }
        port
    }

    fn attr<T>(
        &self,
        handle: NativeHandle,
        get: impl FnOnce(&dyn serialport::SerialPort) -> serialport::Result<T>,
        code: impl FnOnce(T) -> i32,
    ) -> i32 {
        let Some(port) = self.port(handle) else {
            return -1;
        };
        let guard = port.writer.lock();
        match get(&**guard) {
            Ok(value) => code(value),
            Err(e) => {
                fail(serial_code(&e));
                -1
            }
        }
    }
}

impl Default for SerialportBridge {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl NativeBridge for SerialportBridge {
    fn library_version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    fn port_names(&self) -> Option<Vec<String>> {
        match serialport::available_ports() {
            Ok(ports) => Some(ports.into_iter().map(|p| p.port_name).collect()),
            Err(e) => {
                fail(serial_code(&e));
                None
            }
        }
    }

    fn last_error(&self) -> i32 {
        LAST_ERROR.with(Cell::get)
    }

    fn clear_last_error(&self) {
        LAST_ERROR.with(|e| e.set(codes::NONE));
    }

    fn open(&self, name: &str) -> NativeHandle {
        let opened = serialport::new(name, 9600)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(self.default_timeout)
            .open()
            .and_then(|reader| {
                let writer = reader.try_clone()?;
                Ok((reader, writer))
            });

        match opened {
            Ok((reader, writer)) => {
                let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
                self.ports.write().insert(
                    handle,
                    Arc::new(OpenPort {
                        reader: Mutex::new(reader),
                        writer: Mutex::new(writer),
                    }),
                );
                trace!(port = name, handle, "serialport opened");
                handle
            }
            Err(e) => {
                fail(serial_code(&e));
                CLOSED_HANDLE
            }
        }
    }

    fn close(&self, handle: NativeHandle) -> bool {
        match self.ports.write().remove(&handle) {
            Some(_) => true,
            None => {
                fail(codes::INVALID_PARAM);
                false
            }
        }
    }

    fn configure(
        &self,
        handle: NativeHandle,
        baud: i32,
        data_bits: i32,
        parity: i32,
        stop_bits: i32,
    ) -> bool {
        let Some(port) = self.port(handle) else {
            return false;
        };

        let data_bits = match DataBits::from_code(data_bits) {
            Some(DataBits::Five) => serialport::DataBits::Five,
            Some(DataBits::Six) => serialport::DataBits::Six,
            Some(DataBits::Seven) => serialport::DataBits::Seven,
            Some(DataBits::Eight) => serialport::DataBits::Eight,
            None => {
                fail(codes::INVALID_PARAM);
                return false;
            }
        };
        let parity = match Parity::from_code(parity) {
            Some(Parity::None) => serialport::Parity::None,
            Some(Parity::Even) => serialport::Parity::Even,
            Some(Parity::Odd) => serialport::Parity::Odd,
            None => {
                fail(codes::INVALID_PARAM);
                return false;
            }
        };
        let stop_bits = match StopBits::from_code(stop_bits) {
            Some(StopBits::One) => serialport::StopBits::One,
            Some(StopBits::Two) => serialport::StopBits::Two,
            // Not representable through `serialport`.
            Some(StopBits::OnePointFive) | None => {
                fail(codes::INVALID_PARAM);
                return false;
            }
        };
        let Ok(baud) = u32::try_from(baud) else {
            fail(codes::INVALID_PARAM);
            return false;
        };

        let line = LineSettings {
            baud,
            data_bits,
            parity,
            stop_bits,
        };
        let mut dev = port.writer.lock();
        match apply_line_settings(&mut **dev, line) {
            Ok(()) => true,
            Err(e) => {
                fail(serial_code(&e));
                false
            }
        }
    }

    fn purge(&self, handle: NativeHandle, kind: i32) -> bool {
        let Some(port) = self.port(handle) else {
            return false;
        };
        let buffer = match PurgeType::from_code(kind) {
            Some(PurgeType::Rx) => serialport::ClearBuffer::Input,
            Some(PurgeType::Tx) => serialport::ClearBuffer::Output,
            Some(PurgeType::RxTx) => serialport::ClearBuffer::All,
            None => {
                fail(codes::INVALID_PARAM);
                return false;
            }
        };

        let result = port.writer.lock().clear(buffer);
        result.map_err(|e| fail(serial_code(&e))).is_ok()
    }

    fn baud(&self, handle: NativeHandle) -> i32 {
        self.attr(handle, |p| p.baud_rate(), |b| i32::try_from(b).unwrap_or(i32::MAX))
    }

    fn data_bits(&self, handle: NativeHandle) -> i32 {
        self.attr(
            handle,
            |p| p.data_bits(),
            |d| match d {
                serialport::DataBits::Five => DataBits::Five.code(),
                serialport::DataBits::Six => DataBits::Six.code(),
                serialport::DataBits::Seven => DataBits::Seven.code(),
                serialport::DataBits::Eight => DataBits::Eight.code(),
            },
        )
    }

    fn parity(&self, handle: NativeHandle) -> i32 {
        self.attr(
            handle,
            |p| p.parity(),
            |p| match p {
                serialport::Parity::None => Parity::None.code(),
                serialport::Parity::Even => Parity::Even.code(),
                serialport::Parity::Odd => Parity::Odd.code(),
            },
        )
    }

    fn stop_bits(&self, handle: NativeHandle) -> i32 {
        self.attr(
            handle,
            |p| p.stop_bits(),
            |s| match s {
                serialport::StopBits::One => StopBits::One.code(),
                serialport::StopBits::Two => StopBits::Two.code(),
            },
        )
    }

    fn set_read_timeout(&self, handle: NativeHandle, millis: i64) -> bool {
        let Some(port) = self.port(handle) else {
            return false;
        };
        let Ok(millis) = u64::try_from(millis) else {
            fail(codes::INVALID_PARAM);
            return false;
        };

        let result = port
            .reader
            .lock()
            .set_timeout(Duration::from_millis(millis));
        result.map_err(|e| fail(serial_code(&e))).is_ok()
    }

    fn read_timeout(&self, handle: NativeHandle) -> i64 {
        match self.port(handle) {
            Some(port) => {
                let timeout = port.reader.lock().timeout();
                i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX)
            }
            None => -1,
        }
    }

    fn read(&self, handle: NativeHandle, buf: &mut [u8]) -> i32 {
        let Some(port) = self.port(handle) else {
            return -1;
        };
        let len = buf.len().min(i32::MAX as usize);

        let result = port.reader.lock().read(&mut buf[..len]);
        match result {
            Ok(n) => n as i32,
            Err(e) => {
                fail(io_code(e.kind()));
                -1
            }
        }
    }

    fn write(&self, handle: NativeHandle, buf: &[u8]) -> bool {
        let Some(port) = self.port(handle) else {
            return false;
        };

        let result = port.writer.lock().write_all(buf);
        result.map_err(|e| fail(io_code(e.kind()))).is_ok()
    }

    fn flush(&self, handle: NativeHandle) -> bool {
        let Some(port) = self.port(handle) else {
            return false;
        };

        let result = port.writer.lock().flush();
        result.map_err(|e| fail(io_code(e.kind()))).is_ok()
    }
}
