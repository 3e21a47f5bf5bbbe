//! Translation of native error codes.

use super::{codes, NativeBridge};
use crate::port::PortError;

/// Read and clear the bridge's last error code.
///
/// Must run on the thread that made the failing call, with no other native
/// call in between.
pub fn take_code(bridge: &dyn NativeBridge) -> i32 {
    let code = bridge.last_error();
    bridge.clear_last_error();
    code
}

/// Map a native error code to a [`PortError`].
pub fn map_code(code: i32) -> PortError {
    match code {
        codes::TIMEOUT => PortError::Timeout,
        codes::ACCESS => PortError::AccessDenied,
        codes::IO => PortError::Io,
        other => PortError::Native(other),
    }
}

/// Take the last error and map it.
pub fn take_error(bridge: &dyn NativeBridge) -> PortError {
    map_code(take_code(bridge))
}
