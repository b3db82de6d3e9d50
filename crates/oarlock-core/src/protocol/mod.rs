//! The monitor's line-oriented serial protocol.
//!
//! The monitor exchanges ASCII frames terminated by CRLF. The transport
//! strips the delimiter before frames reach the codec, so everything in this
//! module works on bare frame text.

pub mod codec;
mod error;
pub mod message;

pub use codec::MessageCodec;
pub use error::ProtocolError;
pub use message::{DataMemoryMessage, Memory, Message, ReadMemoryMessage, StrokeType};

/// Baud rate of the monitor's USB serial port (19200 8N1).
pub const DEFAULT_BAUD_RATE: u32 = 19200;

/// Highest addressable memory location in the rowing computer.
pub const MAX_MEMORY_LOCATION: u16 = 0x0FFF;
