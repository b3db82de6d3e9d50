//! # Oarlock Core Library
//!
//! Host-side driver for WaterRower S4/S5 performance monitors.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - ASCII frame codec for the monitor's serial protocol
//! - Connection handshake and lifecycle management
//! - Subscriptions to workout data with periodic memory polling
//! - Liveness supervision of the connected device
//!
//! ## Supported monitors
//!
//! - WaterRower S4
//! - WaterRower S5
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use oarlock_core::prelude::*;
//!
//! let transport = Arc::new(SerialTransport::new(tokio::runtime::Handle::current()));
//! let monitor = RowingMonitor::new(
//!     transport,
//!     MonitorConfig::default(),
//!     tokio::runtime::Handle::current(),
//! );
//!
//! monitor.subscribe(Arc::new(StrokeSubscription::new(|stroke| {
//!     println!("stroke: {stroke:?}");
//! })));
//! monitor.connect("/dev/ttyUSB0")?;
//! ```

pub mod error;
pub mod model;
pub mod monitor;
pub mod protocol;
pub mod subscription;
pub mod transport;
pub mod watchdog;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::MonitorError;
    pub use crate::model::{ErrorCode, ModelInformation, MonitorType};
    pub use crate::monitor::{MonitorConfig, MonitorListener, RowingMonitor};
    pub use crate::protocol::message::{
        DataMemoryMessage, Memory, Message, ReadMemoryMessage, StrokeType,
    };
    pub use crate::subscription::{
        MemorySubscription, PulseCountSubscription, StrokeSubscription, Subscription,
    };
    pub use crate::transport::{available_ports, SerialTransport, Transport};
}

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
