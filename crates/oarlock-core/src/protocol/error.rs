//! Protocol errors.

use thiserror::Error;

/// Errors raised by the message codec.
///
/// Malformed inbound frames are not errors; the codec logs and drops them.
/// A codec error always indicates a caller defect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Encode was requested for a message the monitor sends to the host.
    #[error("'{0}' messages cannot be sent to the monitor")]
    WrongDirection(&'static str),
}
