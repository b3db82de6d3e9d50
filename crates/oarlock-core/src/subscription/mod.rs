//! Subscriptions to monitor data.
//!
//! A subscription reacts to inbound messages and may also produce a poll
//! request once per engine tick. Push-only subscriptions (strokes, pulse
//! counts) never poll; the monitor transmits those frames unsolicited.

pub mod engine;

pub use engine::{MessageSender, SubscriptionEngine};

use std::sync::Mutex;

use crate::protocol::message::{Memory, Message, ReadMemoryMessage, StrokeType};

/// A caller-registered reactor to inbound messages, optionally also a
/// periodic poll-request generator.
pub trait Subscription: Send + Sync {
    /// Message to send on the next poll tick, or `None` for push-only
    /// subscriptions.
    fn poll(&self) -> Option<Message>;

    /// Offered every inbound message while the engine is running.
    fn on_message(&self, message: &Message);
}

/// Push-only subscription for stroke start/end events.
pub struct StrokeSubscription {
    callback: Box<dyn Fn(StrokeType) + Send + Sync>,
}

impl StrokeSubscription {
    /// Invoke `callback` for every stroke event.
    pub fn new(callback: impl Fn(StrokeType) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl Subscription for StrokeSubscription {
    fn poll(&self) -> Option<Message> {
        // Strokes are transmitted automatically, nothing to request.
        None
    }

    fn on_message(&self, message: &Message) {
        if let Message::Stroke(stroke) = message {
            (self.callback)(*stroke);
        }
    }
}

/// Push-only subscription for the 25 ms pulse count.
pub struct PulseCountSubscription {
    callback: Box<dyn Fn(u8) + Send + Sync>,
}

impl PulseCountSubscription {
    /// Invoke `callback` with each reported pulse count.
    pub fn new(callback: impl Fn(u8) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl Subscription for PulseCountSubscription {
    fn poll(&self) -> Option<Message> {
        None
    }

    fn on_message(&self, message: &Message) {
        if let Message::PulseCount { pulses } = message {
            (self.callback)(*pulses);
        }
    }
}

/// Polls one memory location and reports its combined value on change.
///
/// The monitor keeps answering polls even when nothing moved, so the last
/// seen value is cached and the callback only fires when it differs.
pub struct MemorySubscription {
    memory: Memory,
    location: u16,
    last: Mutex<Option<u32>>,
    callback: Box<dyn Fn(u32) + Send + Sync>,
}

impl MemorySubscription {
    /// Poll `location` with a read of the given [`Memory`] width and invoke
    /// `callback` whenever the reported value changes.
    pub fn new(
        memory: Memory,
        location: u16,
        callback: impl Fn(u32) + Send + Sync + 'static,
    ) -> Self {
        Self {
            memory,
            location,
            last: Mutex::new(None),
            callback: Box::new(callback),
        }
    }
}

impl Subscription for MemorySubscription {
    fn poll(&self) -> Option<Message> {
        Some(Message::ReadMemory(ReadMemoryMessage {
            memory: self.memory,
            location: self.location,
        }))
    }

    fn on_message(&self, message: &Message) {
        let Message::DataMemory(data) = message else {
            return;
        };
        if data.memory != self.memory || data.location != self.location {
            return;
        }
        let value = data.value();
        {
            let mut last = self.last.lock().unwrap();
            if *last == Some(value) {
                return;
            }
            *last = Some(value);
        }
        (self.callback)(value);
    }
}
