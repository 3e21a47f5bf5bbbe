//! Concurrency-safe handle over one open native device.

use super::error::PortError;
use super::gate::AccessGate;
use super::stream::{PortReader, PortWriter};
use super::types::{DataBits, Parity, PortSettings, PurgeType, StopBits};
use crate::native::{
    self, codes, map_code, take_code, take_error, NativeBridge, NativeHandle, CLOSED_HANDLE,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// State guarded by the access gate.
#[derive(Debug)]
struct PortState {
    handle: NativeHandle,
    /// Mirror of the device settings, updated only after a native call succeeds.
    settings: PortSettings,
}

impl PortState {
    fn open_handle(&self) -> Result<NativeHandle, PortError> {
        match self.handle {
            CLOSED_HANDLE => Err(PortError::NotOpen),
            handle => Ok(handle),
        }
    }
}

#[derive(Debug)]
struct PortShared {
    name: String,
    bridge: Arc<dyn NativeBridge>,
    gate: AccessGate<PortState>,
}

impl Drop for PortShared {
    fn drop(&mut self) {
        let handle = self.gate.get_mut().handle;
        if handle == CLOSED_HANDLE {
            return;
        }
        if self.bridge.close(handle) {
            debug!(port = %self.name, "Closed on drop");
        } else {
            let code = take_code(self.bridge.as_ref());
            warn!(port = %self.name, code, "Failed to close port on drop");
        }
    }
}

/// An open serial device.
///
/// Clones share the same native handle. Reads and writes may run at the
/// same time from different threads; `close`, `configure`, the purges,
/// `set_read_timeout` and the getters wait for both to finish and keep
/// them out while running. The device is closed when the last clone (and
/// the last stream adapter) is dropped.
///
/// # Example
/// ```
/// use native_serial::native::MockBridge;
/// use native_serial::port::{DataBits, Parity, SerialPort, StopBits};
/// use std::io::{Read, Write};
/// use std::sync::Arc;
///
/// let bridge = MockBridge::new().with_device("COM-TEST");
/// bridge.enqueue_read("COM-TEST", b"pong");
///
/// let port = SerialPort::open_with(Arc::new(bridge.clone()), "COM-TEST")?;
/// port.configure(2400, DataBits::Seven, Parity::Even, StopBits::Two)?;
/// assert_eq!(port.to_string(), "COM-TEST 2400 7E2");
///
/// port.writer().write_all(b"ping")?;
/// let mut buf = [0u8; 4];
/// port.reader().read_exact(&mut buf)?;
/// assert_eq!(&buf, b"pong");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct SerialPort {
    shared: Arc<PortShared>,
}

impl SerialPort {
    /// Open `name` through the process-wide bridge, initializing it on first use.
    pub fn open(name: &str) -> Result<Self, PortError> {
        Self::open_with(native::bridge()?, name)
    }

    /// Open `name` through an explicit bridge.
    pub fn open_with(bridge: Arc<dyn NativeBridge>, name: &str) -> Result<Self, PortError> {
        if name.is_empty() || name.contains('\0') {
            return Err(PortError::InvalidName(name.to_string()));
        }

        let handle = bridge.open(name);
        if handle == CLOSED_HANDLE {
            return Err(take_error(bridge.as_ref()));
        }

        let settings = match read_settings(bridge.as_ref(), handle) {
            Ok(settings) => settings,
            Err(e) => {
                // No handle escapes a failed open.
                if !bridge.close(handle) {
                    bridge.clear_last_error();
                }
                return Err(e);
            }
        };

        info!(port = name, %settings, "Port opened");
        Ok(Self {
            shared: Arc::new(PortShared {
                name: name.to_string(),
                bridge,
                gate: AccessGate::new(PortState { handle, settings }),
            }),
        })
    }

    /// Device name this port was opened with.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn is_open(&self) -> bool {
        self.shared.gate.exclusive().handle != CLOSED_HANDLE
    }

    /// Release the native handle. Closing a closed port does nothing.
    ///
    /// If the driver refuses, the port stays open and the error is returned.
    pub fn close(&self) -> Result<(), PortError> {
        let mut state = self.shared.gate.exclusive();
        if state.handle == CLOSED_HANDLE {
            return Ok(());
        }

        let bridge = self.bridge();
        if !bridge.close(state.handle) {
            return Err(take_error(bridge));
        }
        state.handle = CLOSED_HANDLE;
        info!(port = %self.shared.name, "Port closed");
        Ok(())
    }

    /// Change all line settings at once.
    pub fn configure(
        &self,
        baud: u32,
        data_bits: DataBits,
        parity: Parity,
        stop_bits: StopBits,
    ) -> Result<(), PortError> {
        let native_baud = i32::try_from(baud).map_err(|_| PortError::InvalidBaud(baud))?;

        let mut state = self.shared.gate.exclusive();
        let handle = state.open_handle()?;
        let bridge = self.bridge();
        if !bridge.configure(
            handle,
            native_baud,
            data_bits.code(),
            parity.code(),
            stop_bits.code(),
        ) {
            return Err(take_error(bridge));
        }

        state.settings.baud = baud;
        state.settings.data_bits = data_bits;
        state.settings.parity = parity;
        state.settings.stop_bits = stop_bits;
        debug!(port = %self.shared.name, settings = %state.settings, "Port configured");
        Ok(())
    }

    /// Discard buffered data in the driver.
    pub fn purge(&self, kind: PurgeType) -> Result<(), PortError> {
        let state = self.shared.gate.exclusive();
        let handle = state.open_handle()?;
        let bridge = self.bridge();
        if !bridge.purge(handle, kind.code()) {
            return Err(take_error(bridge));
        }
        trace!(port = %self.shared.name, ?kind, "Purged");
        Ok(())
    }

    pub fn purge_rx(&self) -> Result<(), PortError> {
        self.purge(PurgeType::Rx)
    }

    pub fn purge_tx(&self) -> Result<(), PortError> {
        self.purge(PurgeType::Tx)
    }

    /// Set how long a read blocks waiting for data. Negative values are rejected.
    pub fn set_read_timeout_millis(&self, millis: i64) -> Result<(), PortError> {
        if millis < 0 {
            return Err(PortError::InvalidTimeout(millis));
        }

        let mut state = self.shared.gate.exclusive();
        let handle = state.open_handle()?;
        let bridge = self.bridge();
        if !bridge.set_read_timeout(handle, millis) {
            return Err(take_error(bridge));
        }
        state.settings.read_timeout_ms = millis;
        debug!(port = %self.shared.name, millis, "Read timeout set");
        Ok(())
    }

    pub fn set_read_timeout(&self, timeout: Duration) -> Result<(), PortError> {
        let millis = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        self.set_read_timeout_millis(millis)
    }

    /// Snapshot of the cached settings.
    pub fn settings(&self) -> Result<PortSettings, PortError> {
        let state = self.shared.gate.exclusive();
        state.open_handle()?;
        Ok(state.settings)
    }

    pub fn baud(&self) -> Result<u32, PortError> {
        Ok(self.settings()?.baud)
    }

    pub fn data_bits(&self) -> Result<DataBits, PortError> {
        Ok(self.settings()?.data_bits)
    }

    pub fn parity(&self) -> Result<Parity, PortError> {
        Ok(self.settings()?.parity)
    }

    pub fn stop_bits(&self) -> Result<StopBits, PortError> {
        Ok(self.settings()?.stop_bits)
    }

    pub fn read_timeout_millis(&self) -> Result<i64, PortError> {
        Ok(self.settings()?.read_timeout_ms)
    }

    pub fn read_timeout(&self) -> Result<Duration, PortError> {
        let millis = self.read_timeout_millis()?;
        Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
    }

    /// Byte source over this port.
    pub fn reader(&self) -> PortReader {
        PortReader::new(self.clone())
    }

    /// Byte sink over this port.
    pub fn writer(&self) -> PortWriter {
        PortWriter::new(self.clone())
    }

    fn bridge(&self) -> &dyn NativeBridge {
        self.shared.bridge.as_ref()
    }

    /// Read into `buf`. `Ok(0)` means end of stream, either reported by the
    /// driver or because the port is closed.
    pub(crate) fn read_bytes(&self, buf: &mut [u8]) -> Result<usize, PortError> {
        if buf.is_empty() {
            return Ok(0);
        }

        let state = self.shared.gate.read();
        if state.handle == CLOSED_HANDLE {
            return Ok(0);
        }

        let bridge = self.bridge();
        let n = bridge.read(state.handle, buf);
        if n > 0 {
            trace!(port = %self.shared.name, bytes = n, "Read");
            return Ok(n as usize);
        }
        if n == 0 {
            return Err(PortError::Timeout);
        }

        // Taken while the unit is still held, before any other native call
        // on this thread.
        match take_code(bridge) {
            codes::EOF => Ok(0),
            code => Err(map_code(code)),
        }
    }

    /// Write all of `buf`.
    pub(crate) fn write_bytes(&self, buf: &[u8]) -> Result<(), PortError> {
        let state = self.shared.gate.write();
        if state.handle == CLOSED_HANDLE {
            return Err(PortError::Closed);
        }
        if buf.is_empty() {
            return Ok(());
        }

        let bridge = self.bridge();
        if !bridge.write(state.handle, buf) {
            return Err(take_error(bridge));
        }
        trace!(port = %self.shared.name, bytes = buf.len(), "Wrote");
        Ok(())
    }

    pub(crate) fn flush_output(&self) -> Result<(), PortError> {
        let state = self.shared.gate.write();
        if state.handle == CLOSED_HANDLE {
            return Err(PortError::Closed);
        }

        let bridge = self.bridge();
        if !bridge.flush(state.handle) {
            return Err(take_error(bridge));
        }
        Ok(())
    }
}

/// `COM1 9600 8N1`, with ` (closed)` appended once closed.
impl fmt::Display for SerialPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.gate.exclusive();
        write!(f, "{} {}", self.shared.name, state.settings)?;
        if state.handle == CLOSED_HANDLE {
            f.write_str(" (closed)")?;
        }
        Ok(())
    }
}

fn read_settings(
    bridge: &dyn NativeBridge,
    handle: NativeHandle,
) -> Result<PortSettings, PortError> {
    let read_timeout_ms = bridge.read_timeout(handle);
    if read_timeout_ms < 0 {
        return Err(take_error(bridge));
    }
    let baud = bridge.baud(handle);
    let baud = u32::try_from(baud).map_err(|_| take_error(bridge))?;

    Ok(PortSettings {
        baud,
        data_bits: DataBits::decode(native_attr(bridge, bridge.data_bits(handle))?)?,
        parity: Parity::decode(native_attr(bridge, bridge.parity(handle))?)?,
        stop_bits: StopBits::decode(native_attr(bridge, bridge.stop_bits(handle))?)?,
        read_timeout_ms,
    })
}

fn native_attr(bridge: &dyn NativeBridge, value: i32) -> Result<i32, PortError> {
    if value < 0 {
        Err(take_error(bridge))
    } else {
        Ok(value)
    }
}
