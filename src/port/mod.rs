//! Port handles and stream adapters.
//!
//! A [`SerialPort`] owns one native handle behind a two-unit [`AccessGate`],
//! so a reader and a writer can work at the same time while control
//! operations run alone.

pub mod error;
pub mod gate;
pub mod handle;
pub mod stream;
pub mod types;

pub use error::PortError;
pub use gate::AccessGate;
pub use handle::SerialPort;
pub use stream::{PortReader, PortWriter};
pub use types::{DataBits, Parity, PortSettings, PurgeType, StopBits};
