//! Frame ↔ message translation.
//!
//! One interpreter per inbound message type, keyed by the fixed identifier
//! prefix of its frame. Decoding never fails with an error: malformed or
//! unknown frames are logged and dropped so that arbitrary device output
//! cannot crash the frame pipeline. Encoding fails only when asked to send
//! a message the monitor itself produces, which is a caller defect.

use tracing::warn;

use super::error::ProtocolError;
use super::message::{DataMemoryMessage, Memory, Message, StrokeType};
use crate::model::{ModelInformation, MonitorType};

/// Decoder/encoder pair for the monitor's ASCII frames.
///
/// The interpreter registry is fixed at compile time; the codec itself is
/// stateless and cheap to share.
#[derive(Debug, Default)]
pub struct MessageCodec;

struct Interpreter {
    identifier: &'static str,
    decode: fn(&str) -> Option<Message>,
}

// Matching is exact prefix equality, checked in table order. `PING` must
// come before `P`, the one place where one identifier is a prefix of
// another on the wire.
const INTERPRETERS: &[Interpreter] = &[
    Interpreter {
        identifier: "IV",
        decode: decode_model_information,
    },
    Interpreter {
        identifier: "ID",
        decode: decode_data_memory,
    },
    Interpreter {
        identifier: "_",
        decode: decode_hardware_type,
    },
    Interpreter {
        identifier: "OK",
        decode: decode_acknowledge,
    },
    Interpreter {
        identifier: "E",
        decode: decode_error,
    },
    Interpreter {
        identifier: "PING",
        decode: decode_ping,
    },
    Interpreter {
        identifier: "P",
        decode: decode_pulse_count,
    },
    Interpreter {
        identifier: "S",
        decode: decode_stroke,
    },
];

impl MessageCodec {
    /// Create the codec with its built-in interpreter registry.
    pub fn new() -> Self {
        Self
    }

    /// Decode one delimiter-stripped frame.
    ///
    /// Returns `None` when no interpreter claims the frame or the claiming
    /// interpreter rejects the payload as malformed. Both cases are logged
    /// and the frame is dropped; neither is an error.
    pub fn decode(&self, frame: &str) -> Option<Message> {
        if !frame.is_ascii() {
            warn!(frame, "non-ASCII frame dropped");
            return None;
        }
        for interpreter in INTERPRETERS {
            if frame.starts_with(interpreter.identifier) {
                let decoded = (interpreter.decode)(frame);
                if decoded.is_none() {
                    warn!(frame, "malformed frame dropped");
                }
                return decoded;
            }
        }
        warn!(frame, "frame with unknown identifier dropped");
        None
    }

    /// Encode an outbound message to its frame text (without delimiter).
    ///
    /// Fails with [`ProtocolError::WrongDirection`] for messages that only
    /// the monitor sends.
    pub fn encode(&self, message: &Message) -> Result<String, ProtocolError> {
        match message {
            Message::StartCommunication => Ok("USB".to_string()),
            Message::ExitCommunication => Ok("EXIT".to_string()),
            Message::Reset => Ok("RESET".to_string()),
            Message::RequestModelInformation => Ok("IV?".to_string()),
            Message::ReadMemory(read) => Ok(format!(
                "IR{}{:03X}",
                read.memory.wire_char(),
                read.location & super::MAX_MEMORY_LOCATION
            )),
            inbound => Err(ProtocolError::WrongDirection(inbound.type_name())),
        }
    }
}

fn decode_hardware_type(frame: &str) -> Option<Message> {
    // Anything else starting with '_' is some other hardware.
    Some(Message::HardwareType {
        water_rower: frame.starts_with("_WR_"),
    })
}

fn decode_acknowledge(frame: &str) -> Option<Message> {
    (frame == "OK").then_some(Message::Acknowledge)
}

fn decode_error(frame: &str) -> Option<Message> {
    // "ERROR"; the payload content carries no information.
    (frame.len() >= 5).then_some(Message::Error)
}

fn decode_ping(frame: &str) -> Option<Message> {
    (frame == "PING").then_some(Message::Ping)
}

fn decode_pulse_count(frame: &str) -> Option<Message> {
    let payload = frame.strip_prefix('P')?;
    if payload.len() != 2 {
        return None;
    }
    let pulses = u8::from_str_radix(payload, 16).ok()?;
    Some(Message::PulseCount { pulses })
}

fn decode_stroke(frame: &str) -> Option<Message> {
    match frame {
        "SS" => Some(Message::Stroke(StrokeType::Start)),
        "SE" => Some(Message::Stroke(StrokeType::End)),
        _ => None,
    }
}

fn decode_model_information(frame: &str) -> Option<Message> {
    let payload = frame.strip_prefix("IV")?;
    if payload.len() != 5 {
        return None;
    }
    // Version digits must be numeric; the model digit maps to Unknown for
    // anything the driver does not recognize instead of failing.
    if !payload[1..].bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let monitor_type = match payload.as_bytes()[0] {
        b'4' => MonitorType::S4,
        b'5' => MonitorType::S5,
        _ => MonitorType::Unknown,
    };
    let firmware = format!("{}.{}", &payload[1..3], &payload[3..5]);
    Some(Message::ModelInformation(ModelInformation::new(
        monitor_type,
        firmware,
    )))
}

fn decode_data_memory(frame: &str) -> Option<Message> {
    let payload = frame.strip_prefix("ID")?;
    let memory = Memory::from_wire_char(payload.chars().next()?)?;
    let rest = &payload[1..];
    if rest.len() != 3 + memory.byte_count() * 2 {
        return None;
    }
    let location = u16::from_str_radix(&rest[..3], 16).ok()?;

    // Value groups arrive most significant first.
    let hex = &rest[3..];
    let mut bytes = [0u8; 3];
    for (i, byte) in bytes.iter_mut().enumerate().take(memory.byte_count()) {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    let (value1, value2, value3) = match memory {
        Memory::Single => (bytes[0], None, None),
        Memory::Double => (bytes[1], Some(bytes[0]), None),
        Memory::Triple => (bytes[2], Some(bytes[1]), Some(bytes[0])),
    };
    Some(Message::DataMemory(DataMemoryMessage {
        memory,
        location,
        value1,
        value2,
        value3,
    }))
}
