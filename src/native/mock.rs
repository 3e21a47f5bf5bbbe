//! In-memory bridge for testing.
//!
//! Provides a `MockBridge` that behaves like a driver without any hardware.
//! Devices are registered by name, each with its own read queue and write
//! log, and any operation can be made to fail once with a chosen code.

use super::{codes, NativeBridge, NativeHandle, CLOSED_HANDLE};
use crate::port::{DataBits, Parity, PurgeType, StopBits};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Operations whose next call can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    PortNames,
    Open,
    Close,
    Configure,
    Purge,
    SetReadTimeout,
    /// Any of the attribute and timeout getters.
    GetAttribute,
    Read,
    Write,
    Flush,
}

/// State of one simulated device.
#[derive(Debug)]
struct MockDevice {
    baud: i32,
    data_bits: i32,
    parity: i32,
    stop_bits: i32,
    timeout_ms: i64,
    /// Bytes returned by reads.
    read_queue: VecDeque<u8>,
    /// One entry per write call.
    write_log: Vec<Vec<u8>>,
    flushes: usize,
    purges: Vec<i32>,
    /// Reads on an empty queue report end of stream instead of a timeout.
    eof: bool,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self {
            baud: 9600,
            data_bits: DataBits::Eight.code(),
            parity: Parity::None.code(),
            stop_bits: StopBits::One.code(),
            timeout_ms: 1000,
            read_queue: VecDeque::new(),
            write_log: Vec::new(),
            flushes: 0,
            purges: Vec::new(),
            eof: false,
        }
    }
}

#[derive(Debug)]
struct MockState {
    version: String,
    devices: HashMap<String, MockDevice>,
    handles: HashMap<NativeHandle, String>,
    next_handle: NativeHandle,
    errors: HashMap<ThreadId, i32>,
    failures: HashMap<MockOp, i32>,
    hold_reads: bool,
    reads_in_flight: usize,
    hold_writes: bool,
    writes_in_flight: usize,
}

impl MockState {
    fn fail(&mut self, code: i32) {
        self.errors.insert(thread::current().id(), code);
    }

    /// Consume an injected failure for `op`, recording its code.
    fn injected(&mut self, op: MockOp) -> bool {
        match self.failures.remove(&op) {
            Some(code) => {
                self.fail(code);
                true
            }
            None => false,
        }
    }

    fn device(&mut self, handle: NativeHandle) -> Option<&mut MockDevice> {
        let found = self
            .handles
            .get(&handle)
            .and_then(|name| self.devices.get_mut(name));
        if found.is_none() {
            self.errors
                .insert(thread::current().id(), codes::INVALID_PARAM);
        }
        found
    }
}

/// Mock bridge for testing.
///
/// Clones share state, so a test can keep one clone for inspection while a
/// port handle owns another.
///
/// # Example
/// ```
/// use native_serial::native::{MockBridge, NativeBridge};
///
/// let bridge = MockBridge::new().with_device("COM1");
/// bridge.enqueue_read("COM1", b"hi");
///
/// let handle = bridge.open("COM1");
/// let mut buf = [0u8; 4];
/// assert_eq!(bridge.read(handle, &mut buf), 2);
/// assert!(bridge.write(handle, b"ok"));
/// assert_eq!(bridge.written("COM1"), b"ok");
/// ```
#[derive(Debug, Clone)]
pub struct MockBridge {
    state: Arc<Mutex<MockState>>,
    wake: Arc<Condvar>,
}

impl MockBridge {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                version: "0.1.0".to_string(),
                devices: HashMap::new(),
                handles: HashMap::new(),
                next_handle: 1,
                errors: HashMap::new(),
                failures: HashMap::new(),
                hold_reads: false,
                reads_in_flight: 0,
                hold_writes: false,
                writes_in_flight: 0,
            })),
            wake: Arc::new(Condvar::new()),
        }
    }

    pub fn with_version(self, version: impl Into<String>) -> Self {
        self.state.lock().version = version.into();
        self
    }

    pub fn with_device(self, name: impl Into<String>) -> Self {
        self.add_device(name);
        self
    }

    /// Register a device with default settings (9600 8N1, 1 s timeout).
    pub fn add_device(&self, name: impl Into<String>) {
        self.state
            .lock()
            .devices
            .entry(name.into())
            .or_default();
    }

    /// Append bytes to the device's read queue.
    pub fn enqueue_read(&self, name: &str, data: &[u8]) {
        let mut state = self.state.lock();
        if let Some(device) = state.devices.get_mut(name) {
            device.read_queue.extend(data);
        }
        self.wake.notify_all();
    }

    /// Make reads on an empty queue report end of stream.
    pub fn set_eof(&self, name: &str, eof: bool) {
        if let Some(device) = self.state.lock().devices.get_mut(name) {
            device.eof = eof;
        }
    }

    /// Everything written to the device, concatenated.
    pub fn written(&self, name: &str) -> Vec<u8> {
        self.write_log(name).concat()
    }

    /// Write calls seen by the device, in order.
    pub fn write_log(&self, name: &str) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .devices
            .get(name)
            .map(|d| d.write_log.clone())
            .unwrap_or_default()
    }

    pub fn flush_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .devices
            .get(name)
            .map_or(0, |d| d.flushes)
    }

    /// Purge codes received by the device, in order.
    pub fn purges(&self, name: &str) -> Vec<i32> {
        self.state
            .lock()
            .devices
            .get(name)
            .map(|d| d.purges.clone())
            .unwrap_or_default()
    }

    /// Fail the next call of `op` with `code`.
    pub fn fail_next(&self, op: MockOp, code: i32) {
        self.state.lock().failures.insert(op, code);
    }

    pub fn fail_open(&self, code: i32) {
        self.fail_next(MockOp::Open, code);
    }

    /// While held, reads block inside the bridge until released.
    pub fn hold_reads(&self, hold: bool) {
        self.state.lock().hold_reads = hold;
        self.wake.notify_all();
    }

    /// Number of reads currently executing inside the bridge.
    pub fn reads_in_flight(&self) -> usize {
        self.state.lock().reads_in_flight
    }

    /// While held, writes block inside the bridge until released.
    pub fn hold_writes(&self, hold: bool) {
        self.state.lock().hold_writes = hold;
        self.wake.notify_all();
    }

    pub fn writes_in_flight(&self) -> usize {
        self.state.lock().writes_in_flight
    }

    pub fn is_handle_open(&self, handle: NativeHandle) -> bool {
        self.state.lock().handles.contains_key(&handle)
    }

    /// Handles currently open, across all devices.
    pub fn open_handles(&self) -> usize {
        self.state.lock().handles.len()
    }
}

impl MockBridge {
    fn attribute<T: From<i8>>(
        &self,
        handle: NativeHandle,
        get: impl FnOnce(&MockDevice) -> T,
    ) -> T {
        let mut state = self.state.lock();
        if state.injected(MockOp::GetAttribute) {
            return T::from(-1);
        }
        state.device(handle).map_or(T::from(-1), |d| get(d))
    }
}

impl Default for MockBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeBridge for MockBridge {
    fn library_version(&self) -> String {
        self.state.lock().version.clone()
    }

    fn port_names(&self) -> Option<Vec<String>> {
        let mut state = self.state.lock();
        if state.injected(MockOp::PortNames) {
            return None;
        }
        let mut names: Vec<String> = state.devices.keys().cloned().collect();
        names.sort();
        Some(names)
    }

    fn last_error(&self) -> i32 {
        self.state
            .lock()
            .errors
            .get(&thread::current().id())
            .copied()
            .unwrap_or(codes::NONE)
    }

    fn clear_last_error(&self) {
        self.state.lock().errors.remove(&thread::current().id());
    }

    fn open(&self, name: &str) -> NativeHandle {
        let mut state = self.state.lock();
        if state.injected(MockOp::Open) {
            return CLOSED_HANDLE;
        }
        if !state.devices.contains_key(name) {
            state.fail(codes::IO);
            return CLOSED_HANDLE;
        }
        // Devices open exclusively.
        if state.handles.values().any(|open| open == name) {
            state.fail(codes::ACCESS);
            return CLOSED_HANDLE;
        }

        let handle = state.next_handle;
        state.next_handle += 1;
        state.handles.insert(handle, name.to_string());
        handle
    }

    fn close(&self, handle: NativeHandle) -> bool {
        let mut state = self.state.lock();
        if state.injected(MockOp::Close) {
            return false;
        }
        if state.handles.remove(&handle).is_none() {
            state.fail(codes::INVALID_PARAM);
            return false;
        }
        true
    }

    fn configure(
        &self,
        handle: NativeHandle,
        baud: i32,
        data_bits: i32,
        parity: i32,
        stop_bits: i32,
    ) -> bool {
        let mut state = self.state.lock();
        if state.injected(MockOp::Configure) {
            return false;
        }
        let valid = baud > 0
            && DataBits::from_code(data_bits).is_some()
            && Parity::from_code(parity).is_some()
            && StopBits::from_code(stop_bits).is_some();
        if !valid {
            state.fail(codes::INVALID_PARAM);
            return false;
        }

        let Some(device) = state.device(handle) else {
            return false;
        };
        device.baud = baud;
        device.data_bits = data_bits;
        device.parity = parity;
        device.stop_bits = stop_bits;
        true
    }

    fn purge(&self, handle: NativeHandle, kind: i32) -> bool {
        let mut state = self.state.lock();
        if state.injected(MockOp::Purge) {
            return false;
        }
        let Some(purge) = PurgeType::from_code(kind) else {
            state.fail(codes::INVALID_PARAM);
            return false;
        };

        let Some(device) = state.device(handle) else {
            return false;
        };
        if matches!(purge, PurgeType::Rx | PurgeType::RxTx) {
            device.read_queue.clear();
        }
        device.purges.push(kind);
        true
    }

    fn baud(&self, handle: NativeHandle) -> i32 {
        self.attribute(handle, |d| d.baud)
    }

    fn data_bits(&self, handle: NativeHandle) -> i32 {
        self.attribute(handle, |d| d.data_bits)
    }

    fn parity(&self, handle: NativeHandle) -> i32 {
        self.attribute(handle, |d| d.parity)
    }

    fn stop_bits(&self, handle: NativeHandle) -> i32 {
        self.attribute(handle, |d| d.stop_bits)
    }

    fn set_read_timeout(&self, handle: NativeHandle, millis: i64) -> bool {
        let mut state = self.state.lock();
        if state.injected(MockOp::SetReadTimeout) {
            return false;
        }
        if millis < 0 {
            state.fail(codes::INVALID_PARAM);
            return false;
        }
        match state.device(handle) {
            Some(device) => {
                device.timeout_ms = millis;
                true
            }
            None => false,
        }
    }

    fn read_timeout(&self, handle: NativeHandle) -> i64 {
        self.attribute(handle, |d| d.timeout_ms)
    }

    fn read(&self, handle: NativeHandle, buf: &mut [u8]) -> i32 {
        let mut state = self.state.lock();
        state.reads_in_flight += 1;
        while state.hold_reads {
            self.wake.wait(&mut state);
        }
        state.reads_in_flight -= 1;

        if state.injected(MockOp::Read) {
            return -1;
        }
        let Some(device) = state.device(handle) else {
            return -1;
        };

        if device.read_queue.is_empty() {
            let code = if device.eof { codes::EOF } else { codes::TIMEOUT };
            state.fail(code);
            return -1;
        }

        let n = buf.len().min(device.read_queue.len()).min(i32::MAX as usize);
        for (slot, byte) in buf.iter_mut().zip(device.read_queue.drain(..n)) {
            *slot = byte;
        }
        n as i32
    }

    fn write(&self, handle: NativeHandle, buf: &[u8]) -> bool {
        let mut state = self.state.lock();
        state.writes_in_flight += 1;
        while state.hold_writes {
            self.wake.wait(&mut state);
        }
        state.writes_in_flight -= 1;

        if state.injected(MockOp::Write) {
            return false;
        }
        match state.device(handle) {
            Some(device) => {
                device.write_log.push(buf.to_vec());
                true
            }
            None => false,
        }
    }

    fn flush(&self, handle: NativeHandle) -> bool {
        let mut state = self.state.lock();
        if state.injected(MockOp::Flush) {
            return false;
        }
        match state.device(handle) {
            Some(device) => {
                device.flushes += 1;
                true
            }
            None => false,
        }
    }
}
