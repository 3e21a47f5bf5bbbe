//! Byte-stream views over a [`SerialPort`].
//!
//! `PortReader` reports end of stream (`Ok(0)`) once the port is closed or
//! the driver signals end of data; `PortWriter` fails with
//! [`PortError::Closed`] instead. A read that sees no data before the port's
//! read timeout fails with `ErrorKind::TimedOut`.

use super::error::PortError;
use super::handle::SerialPort;
use std::io;

const SKIP_CHUNK: usize = 1024;

/// Pull-based byte source.
#[derive(Debug, Clone)]
pub struct PortReader {
    port: SerialPort,
}

impl PortReader {
    pub(crate) fn new(port: SerialPort) -> Self {
        Self { port }
    }

    pub fn port(&self) -> &SerialPort {
        &self.port
    }

    /// Read one byte; `None` at end of stream.
    pub fn read_byte(&mut self) -> Result<Option<u8>, PortError> {
        let mut byte = [0u8; 1];
        match self.port.read_bytes(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Discard up to `n` bytes, returning how many were skipped.
    ///
    /// Stops early, without error, at end of stream or when the read times out.
    pub fn skip(&mut self, n: u64) -> Result<u64, PortError> {
        let mut buf = [0u8; SKIP_CHUNK];
        let mut remaining = n;

        while remaining > 0 {
            let want = usize::try_from(remaining).map_or(SKIP_CHUNK, |r| r.min(SKIP_CHUNK));
            match self.port.read_bytes(&mut buf[..want]) {
                Ok(0) | Err(PortError::Timeout) => break,
                Ok(read) => remaining -= read as u64,
                Err(e) => return Err(e),
            }
        }

        Ok(n - remaining)
    }

    /// Close the underlying port.
    pub fn close(&self) -> Result<(), PortError> {
        self.port.close()
    }
}

impl io::Read for PortReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.port.read_bytes(buf)?)
    }
}

/// Push-based byte sink. Every write reaches the driver immediately.
#[derive(Debug, Clone)]
pub struct PortWriter {
    port: SerialPort,
}

impl PortWriter {
    pub(crate) fn new(port: SerialPort) -> Self {
        Self { port }
    }

    pub fn port(&self) -> &SerialPort {
        &self.port
    }

    pub fn write_byte(&mut self, byte: u8) -> Result<(), PortError> {
        self.port.write_bytes(&[byte])
    }

    /// Force buffered driver output onto the line.
    pub fn flush_port(&mut self) -> Result<(), PortError> {
        self.port.flush_output()
    }

    pub fn close(&self) -> Result<(), PortError> {
        self.port.close()
    }
}

impl io::Write for PortWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.port.flush_output()?)
    }
}
