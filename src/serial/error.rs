use std::io;

use thiserror::Error;

/// Any error a link might encounter.
#[derive(Debug, Error)]
pub enum SerialPortError {
    /// IO related errors.
    #[error("Underlying IO problem")]
    IO(#[from] io::Error),

    /// The port could not be opened or configured.
    #[error("Could not open port: {0}")]
    Open(#[from] tokio_serial::Error),

    /// An operation needed an open link.
    #[error("Link is not open")]
    NotOpen,

    /// Serial port disconnected.
    #[error("Serial port disconnected")]
    Disconnected,

    /// A write did not complete in time.
    #[error("Write did not complete in time")]
    WriteTimeout,

    /// A failure injected on purpose, see [`crate::mock::MockLink`].
    #[error("Injected failure: {0}")]
    Injected(String),
}
