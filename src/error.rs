use std::io;

use thiserror::Error;

/// Errors thay may occur in this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port enumeration is not supported on this host.
    #[error("Unsupported platform: `{0}`")]
    UnsupportedPlatform(String),

    /// Enumeration found no usable serial port.
    #[error("No serial ports available")]
    NoPortsAvailable,

    /// The configuration did not pass validation.
    #[error("Bad configuration. Problem: `{0}`")]
    BadConfig(String),

    /// Problem reading something from disk.
    #[error("IO problem: {0}")]
    Io(#[from] io::Error),

    /// The manager was asked to start while its loops are still running.
    #[error("The manager is already running")]
    AlreadyRunning,
}

impl Error {
    /// Get the inner bad config message, if this is that variant.
    pub fn try_into_bad_config(self) -> Result<String, Self> {
        if let Self::BadConfig(v) = self {
            Ok(v)
        } else {
            Err(self)
        }
    }
}
