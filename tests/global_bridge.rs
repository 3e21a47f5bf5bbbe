//! The process-wide default bridge.
//!
//! Kept in its own test binary: the default can be installed only once per
//! process.

use native_serial::native::{self, codes, MockBridge, MockOp};
use native_serial::port::{PortError, SerialPort};
use std::sync::Arc;

#[test]
fn test_installed_bridge_serves_free_functions() {
    let mock = MockBridge::new()
        .with_version("0.3.1")
        .with_device("COM2")
        .with_device("COM1");
    native::install(Arc::new(mock.clone())).unwrap();

    // A second default is refused and the first stays in place.
    assert!(native::install(Arc::new(MockBridge::new())).is_err());

    assert_eq!(native::library_version().unwrap(), "0.3.1");
    assert_eq!(native::port_names().unwrap(), ["COM1", "COM2"]);

    let port = SerialPort::open("COM1").unwrap();
    assert_eq!(port.name(), "COM1");
    assert_eq!(mock.open_handles(), 1);
    port.close().unwrap();
    assert_eq!(mock.open_handles(), 0);

    mock.fail_next(MockOp::PortNames, codes::ACCESS);
    assert!(matches!(native::port_names(), Err(PortError::AccessDenied)));
}
