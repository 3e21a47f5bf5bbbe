//! Line settings and their native code tables.
//!
//! The driver and this crate must agree on every code below; a code outside
//! the table coming back from the driver is reported as
//! [`PortError::UnsupportedCode`].

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    pub const fn code(self) -> i32 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            5 => Some(Self::Five),
            6 => Some(Self::Six),
            7 => Some(Self::Seven),
            8 => Some(Self::Eight),
            _ => None,
        }
    }

    pub(crate) fn decode(code: i32) -> Result<Self, PortError> {
        Self::from_code(code).ok_or(PortError::UnsupportedCode {
            kind: "data bits",
            code,
        })
    }
}

impl fmt::Display for DataBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl Parity {
    pub const fn code(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Even => 1,
            Self::Odd => 2,
        }
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Even),
            2 => Some(Self::Odd),
            _ => None,
        }
    }

    pub(crate) fn decode(code: i32) -> Result<Self, PortError> {
        Self::from_code(code).ok_or(PortError::UnsupportedCode {
            kind: "parity",
            code,
        })
    }

    /// Single-letter token used in `8N1`-style notation.
    pub const fn token(self) -> &'static str {
        match self {
            Self::None => "N",
            Self::Even => "E",
            Self::Odd => "O",
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StopBits {
    One,
    Two,
    OnePointFive,
}

impl StopBits {
    pub const fn code(self) -> i32 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::OnePointFive => 3,
        }
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            3 => Some(Self::OnePointFive),
            _ => None,
        }
    }

    pub(crate) fn decode(code: i32) -> Result<Self, PortError> {
        Self::from_code(code).ok_or(PortError::UnsupportedCode {
            kind: "stop bits",
            code,
        })
    }

    pub const fn token(self) -> &'static str {
        match self {
            Self::One => "1",
            Self::Two => "2",
            Self::OnePointFive => "1.5",
        }
    }
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Which driver buffers a purge discards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PurgeType {
    Rx,
    Tx,
    RxTx,
}

impl PurgeType {
    pub const fn code(self) -> i32 {
        match self {
            Self::Rx => 0,
            Self::Tx => 1,
            Self::RxTx => 2,
        }
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Rx),
            1 => Some(Self::Tx),
            2 => Some(Self::RxTx),
            _ => None,
        }
    }
}

/// Last-known settings of an open device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSettings {
    /// Baud rate (bits per second).
    pub baud: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    /// How long a read blocks waiting for data.
    pub read_timeout_ms: i64,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            baud: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            read_timeout_ms: 1000,
        }
    }
}

/// `9600 8N1` notation.
impl fmt::Display for PortSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}{}{}",
            self.baud, self.data_bits, self.parity, self.stop_bits
        )
    }
}
