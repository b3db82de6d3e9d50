//! Crate-wide error type.

use thiserror::Error;

use crate::protocol::ProtocolError;
use crate::transport::TransportError;

/// Errors returned by [`RowingMonitor`](crate::monitor::RowingMonitor)
/// operations.
///
/// Connection lifecycle failures (open, handshake, teardown) never surface
/// here; they are reported asynchronously through the listener, like any
/// other unsolicited disconnect or error event. Only caller-initiated data
/// operations propagate transport failures synchronously.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// A required argument was missing or empty.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The operation requires an open connection.
    #[error("not connected to the monitor")]
    NotConnected,
    /// `connect` was called while a connection is open.
    #[error("already connected to the monitor")]
    AlreadyConnected,
    /// The message cannot travel in the requested direction.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
