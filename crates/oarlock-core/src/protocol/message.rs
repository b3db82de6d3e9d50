//! Typed protocol messages.
//!
//! The protocol is a closed set of message shapes. Each variant travels in
//! exactly one direction: the monitor never accepts its own report frames
//! and the host never receives its own requests.

use crate::model::ModelInformation;

/// How many value bytes accompany a memory location on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Memory {
    /// One value byte.
    Single,
    /// Two value bytes.
    Double,
    /// Three value bytes.
    Triple,
}

impl Memory {
    /// Number of value bytes carried on the wire.
    pub fn byte_count(&self) -> usize {
        match self {
            Memory::Single => 1,
            Memory::Double => 2,
            Memory::Triple => 3,
        }
    }

    /// Wire marker following the `ID`/`IR` identifier.
    pub(crate) fn wire_char(&self) -> char {
        match self {
            Memory::Single => 'S',
            Memory::Double => 'D',
            Memory::Triple => 'T',
        }
    }

    pub(crate) fn from_wire_char(c: char) -> Option<Memory> {
        match c {
            'S' => Some(Memory::Single),
            'D' => Some(Memory::Double),
            'T' => Some(Memory::Triple),
            _ => None,
        }
    }
}

/// Phase of a stroke reported by the rowing computer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrokeType {
    /// Acceleration detected in the paddle (`SS`).
    Start,
    /// Deceleration detected, relax phase entered (`SE`).
    End,
}

/// Value of a memory location reported by the monitor (`ID…`).
///
/// `value1` is the least significant byte and is always present. `value2`
/// and `value3` are only carried for [`Memory::Double`] and
/// [`Memory::Triple`] respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataMemoryMessage {
    /// How many value bytes the reply carries.
    pub memory: Memory,
    /// The memory location that was read (0..=0xFFF).
    pub location: u16,
    /// Least significant value byte.
    pub value1: u8,
    /// Middle value byte, present for double and triple reads.
    pub value2: Option<u8>,
    /// Most significant value byte, present for triple reads only.
    pub value3: Option<u8>,
}

impl DataMemoryMessage {
    /// The value bytes combined into one integer, most significant first.
    pub fn value(&self) -> u32 {
        let mut value = 0u32;
        if let Some(v3) = self.value3 {
            value = (value << 8) | u32::from(v3);
        }
        if let Some(v2) = self.value2 {
            value = (value << 8) | u32::from(v2);
        }
        (value << 8) | u32::from(self.value1)
    }
}

/// Request to read a memory location (`IR…`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadMemoryMessage {
    /// How many value bytes the reply should carry.
    pub memory: Memory,
    /// The memory location to read (0..=0xFFF).
    pub location: u16,
}

/// One protocol frame, typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// `OK` — the monitor accepted the last request.
    Acknowledge,
    /// `ERROR` — the last request was unknown to the monitor.
    Error,
    /// `_WR_` — hardware identity, sent in reply to `USB`.
    HardwareType {
        /// Whether the device identified itself as a WaterRower.
        water_rower: bool,
    },
    /// `IV…` — monitor type and firmware version.
    ModelInformation(ModelInformation),
    /// `PING` — periodic liveness signal while the monitor is idle.
    Ping,
    /// `P…` — pulses counted during the last 25 ms window.
    PulseCount {
        /// Number of pulses counted; zero values are never transmitted.
        pulses: u8,
    },
    /// `SS` / `SE` — stroke start or end.
    Stroke(StrokeType),
    /// `ID…` — value of a memory location.
    DataMemory(DataMemoryMessage),
    /// `USB` — begin communication.
    StartCommunication,
    /// `EXIT` — stop the automatic packets and end communication.
    ExitCommunication,
    /// `RESET` — reset the rowing computer, like the power button.
    Reset,
    /// `IV?` — ask the monitor for its model information.
    RequestModelInformation,
    /// `IR…` — read a memory location.
    ReadMemory(ReadMemoryMessage),
}

impl Message {
    /// Short name of the message type, used in logs and errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::Acknowledge => "Acknowledge",
            Message::Error => "Error",
            Message::HardwareType { .. } => "HardwareType",
            Message::ModelInformation(_) => "ModelInformation",
            Message::Ping => "Ping",
            Message::PulseCount { .. } => "PulseCount",
            Message::Stroke(_) => "Stroke",
            Message::DataMemory(_) => "DataMemory",
            Message::StartCommunication => "StartCommunication",
            Message::ExitCommunication => "ExitCommunication",
            Message::Reset => "Reset",
            Message::RequestModelInformation => "RequestModelInformation",
            Message::ReadMemory(_) => "ReadMemory",
        }
    }
}
