#![deny(missing_docs)]

//! Host side manager for robot controller boards speaking ASIP over serial.
//!
//! The [`manager::AsipManager`] opens a link to the board, resets it, and then
//! runs two loops side by side: one reading lines off the link into a single
//! slot, one dispatching whatever is in that slot to the service it is
//! addressed to. Services send commands back over the same link.
//!
//! Any [`transport::Link`] works. [`serial::SerialLink`] talks to real hardware,
//! [`mock::MockLink`] is handy for testing without a board.

/// The ASIP wire protocol: headers, service ids, requests.
pub mod asip;

/// The link, frames and the receive loop.
pub mod transport;

/// Serial port driver.
pub mod serial;

/// Mocked link.
pub mod mock;

/// Services which handle traffic for a part of the board.
pub mod services;

/// Routing of inbound frames.
pub mod dispatcher;

/// Lifecycle of the whole thing.
pub mod manager;

/// The command line interface.
pub mod cli;

/// Relates to config files.
pub mod config;

/// Possible errors in this library.
pub mod error;

/// Logging/tracing setup.
pub mod logging;
