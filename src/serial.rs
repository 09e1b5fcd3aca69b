/// Serial port related errors.
pub mod error;

/// The serial port link.
pub(crate) mod serial_port;

/// Codecs for decoding frames from wire.
pub(crate) mod codecs;

/// Finding usable serial ports.
pub(crate) mod ports;

pub use ports::enumerate_ports;
pub use serial_port::SerialLink;
