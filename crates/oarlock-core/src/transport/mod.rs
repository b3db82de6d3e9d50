//! Transport boundary.
//!
//! The core talks to the monitor through the [`Transport`] trait and never
//! depends on a concrete byte-level connection. [`serial`] provides the
//! production implementation over the monitor's USB serial port; tests use
//! in-memory stand-ins.

pub mod serial;

pub use serial::{available_ports, SerialTransport};

use std::sync::Arc;
use thiserror::Error;

/// Failure from the underlying byte transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The serial port layer failed.
    #[error("serial port error: {0}")]
    Serial(String),
    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The transport has no open connection.
    #[error("transport is not connected")]
    NotConnected,
    /// `open` was called while a connection is already open.
    #[error("transport is already open")]
    AlreadyOpen,
}

/// Receives transport-level connection events.
///
/// Events for one connection are delivered sequentially from a single task,
/// so implementations never observe two callbacks racing each other.
pub trait TransportListener: Send + Sync {
    /// The physical connection is up.
    fn on_connected(&self);
    /// One delimiter-stripped frame arrived.
    fn on_frame(&self, frame: &str);
    /// The connection went down.
    fn on_disconnected(&self);
    /// The transport failed.
    fn on_error(&self);
}

/// The byte-level connection the driver talks through.
pub trait Transport: Send + Sync {
    /// Open the physical connection to `address`.
    fn open(&self, address: &str) -> Result<(), TransportError>;

    /// Whether the transport currently reports an open connection.
    fn is_connected(&self) -> bool;

    /// Send one frame; the transport appends the wire delimiter.
    fn send(&self, frame: &str) -> Result<(), TransportError>;

    /// Close the physical connection.
    fn close(&self) -> Result<(), TransportError>;

    /// Register the single event listener, replacing any previous one.
    fn set_listener(&self, listener: Arc<dyn TransportListener>);
}
