//! Value objects describing the monitor and its error conditions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rowing computer generation, as reported during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorType {
    /// WaterRower Series 4 rowing computer.
    S4,
    /// WaterRower Series 5 rowing computer.
    S5,
    /// The monitor reported a model this driver does not know.
    Unknown,
}

impl fmt::Display for MonitorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorType::S4 => write!(f, "S4"),
            MonitorType::S5 => write!(f, "S5"),
            MonitorType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Monitor type and firmware version from the model information reply.
///
/// The firmware version is the display string "MAJOR.MINOR" with two
/// decimal digits per component, e.g. `"02.00"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInformation {
    monitor_type: MonitorType,
    firmware_version: String,
}

impl ModelInformation {
    /// Create model information from a monitor type and firmware string.
    pub fn new(monitor_type: MonitorType, firmware_version: String) -> Self {
        Self {
            monitor_type,
            firmware_version,
        }
    }

    /// The rowing computer generation.
    pub fn monitor_type(&self) -> MonitorType {
        self.monitor_type
    }

    /// The firmware version display string, e.g. `"02.00"`.
    pub fn firmware_version(&self) -> &str {
        &self.firmware_version
    }
}

impl fmt::Display for ModelInformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (firmware {})", self.monitor_type, self.firmware_version)
    }
}

/// Error conditions reported to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Communication with the monitor failed.
    CommunicationFailed,
    /// The connected device is not a supported monitor.
    DeviceNotSupported,
    /// The monitor stopped sending liveness signals.
    Timeout,
}
