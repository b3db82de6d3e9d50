//! Connection orchestrator.
//!
//! [`RowingMonitor`] ties the pieces together: it drives the handshake over
//! the transport, feeds decoded messages to the subscription engine, keeps
//! the watchdog informed of device liveness, and reports lifecycle events to
//! registered listeners.

use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::error::MonitorError;
use crate::model::{ErrorCode, ModelInformation, MonitorType};
use crate::protocol::codec::MessageCodec;
use crate::protocol::message::Message;
use crate::subscription::{MessageSender, Subscription, SubscriptionEngine};
use crate::transport::{Transport, TransportListener};
use crate::watchdog::PingWatchdog;

/// Receives connection lifecycle events from the monitor.
pub trait MonitorListener: Send + Sync {
    /// The handshake completed; the device is a supported monitor.
    fn on_connected(&self, model: &ModelInformation);
    /// The connection went down.
    fn on_disconnected(&self);
    /// Something went wrong; the connection may or may not survive.
    fn on_error(&self, error: ErrorCode);
}

/// Tunables for a [`RowingMonitor`].
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Delay between subscription poll ticks.
    pub poll_interval: Duration,
    /// Longest silence from the device before a timeout is reported.
    pub ping_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            // The monitor answers reads well within a tick at 19200 baud.
            poll_interval: Duration::from_millis(50),
            // In pause mode the device pings roughly once a second.
            ping_timeout: Duration::from_secs(5),
        }
    }
}

/// High-level driver for a WaterRower performance monitor.
///
/// Cheap to clone; clones share the same connection.
///
/// Lifecycle failures (open, handshake, teardown) are reported through
/// [`MonitorListener::on_error`] rather than returned, because they can
/// equally happen without any call in progress. Caller-initiated sends
/// return their errors directly.
#[derive(Clone)]
pub struct RowingMonitor {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    codec: MessageCodec,
    listeners: RwLock<Vec<Arc<dyn MonitorListener>>>,
    engine: SubscriptionEngine,
    watchdog: PingWatchdog,
    model: Mutex<Option<ModelInformation>>,
}

/// Lets the engine send polls without keeping the monitor alive.
struct WeakSender {
    inner: Weak<Inner>,
}

impl MessageSender for WeakSender {
    fn send_message(&self, message: &Message) -> Result<(), MonitorError> {
        match self.inner.upgrade() {
            Some(inner) => inner.send_message(message),
            None => Err(MonitorError::NotConnected),
        }
    }
}

/// Forwards transport events into the orchestrator.
struct EventBridge {
    inner: Weak<Inner>,
}

impl TransportListener for EventBridge {
    fn on_connected(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_connected();
        }
    }

    fn on_frame(&self, frame: &str) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_frame(frame);
        }
    }

    fn on_disconnected(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_disconnected();
        }
    }

    fn on_error(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.notify_error(ErrorCode::CommunicationFailed);
        }
    }
}

impl RowingMonitor {
    /// Create a monitor over `transport`. Background tasks run on the
    /// runtime behind `handle`.
    pub fn new(transport: Arc<dyn Transport>, config: MonitorConfig, handle: Handle) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let sender = Arc::new(WeakSender {
                inner: weak.clone(),
            });
            let engine = SubscriptionEngine::new(config.poll_interval, sender, handle.clone());

            let timeout_target = weak.clone();
            let watchdog = PingWatchdog::new(config.ping_timeout, handle, move || {
                if let Some(inner) = timeout_target.upgrade() {
                    warn!("device went silent");
                    inner.notify_error(ErrorCode::Timeout);
                }
            });

            Inner {
                transport,
                codec: MessageCodec::new(),
                listeners: RwLock::new(Vec::new()),
                engine,
                watchdog,
                model: Mutex::new(None),
            }
        });
        inner.transport.set_listener(Arc::new(EventBridge {
            inner: Arc::downgrade(&inner),
        }));
        Self { inner }
    }

    /// Open the connection to the device at `address` and start the
    /// handshake.
    ///
    /// Returns immediately after the physical connection attempt; the
    /// handshake completes in the background and ends in either
    /// [`MonitorListener::on_connected`] or an error event. A failed
    /// connection attempt is likewise reported as an error event.
    pub fn connect(&self, address: &str) -> Result<(), MonitorError> {
        if address.is_empty() {
            return Err(MonitorError::InvalidArgument("address must not be empty"));
        }
        if self.inner.transport.is_connected() {
            return Err(MonitorError::AlreadyConnected);
        }
        info!(address, "connecting");
        if let Err(error) = self.inner.transport.open(address) {
            warn!(%error, "connection attempt failed");
            self.inner.notify_error(ErrorCode::CommunicationFailed);
        }
        Ok(())
    }

    /// Announce the shutdown to the device and close the connection.
    ///
    /// Both steps are attempted even if the first fails; step failures are
    /// reported as error events.
    pub fn disconnect(&self) -> Result<(), MonitorError> {
        if !self.inner.transport.is_connected() {
            return Err(MonitorError::NotConnected);
        }
        info!("disconnecting");
        self.inner.watchdog.stop();
        self.inner.engine.stop();

        if let Err(error) = self.inner.send_message(&Message::ExitCommunication) {
            warn!(%error, "exit announcement failed");
            self.inner.notify_error(ErrorCode::CommunicationFailed);
        }
        if let Err(error) = self.inner.transport.close() {
            warn!(%error, "close failed");
            self.inner.notify_error(ErrorCode::CommunicationFailed);
        }
        Ok(())
    }

    /// Ask the device to reset its workout state.
    pub fn perform_reset(&self) -> Result<(), MonitorError> {
        self.send_message(&Message::Reset)
    }

    /// Encode and transmit one outbound message.
    pub fn send_message(&self, message: &Message) -> Result<(), MonitorError> {
        self.inner.send_message(message)
    }

    /// Register a lifecycle listener.
    pub fn add_listener(&self, listener: Arc<dyn MonitorListener>) {
        self.inner.listeners.write().unwrap().push(listener);
    }

    /// Remove a previously registered lifecycle listener.
    pub fn remove_listener(&self, listener: &Arc<dyn MonitorListener>) {
        self.inner
            .listeners
            .write()
            .unwrap()
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Register a data subscription.
    pub fn subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.inner.engine.subscribe(subscription);
    }

    /// Remove a previously registered data subscription.
    pub fn unsubscribe(&self, subscription: &Arc<dyn Subscription>) {
        self.inner.engine.unsubscribe(subscription);
    }

    /// Model information received during the handshake, if connected.
    pub fn model_information(&self) -> Option<ModelInformation> {
        self.inner.model.lock().unwrap().clone()
    }

    /// Whether the physical connection is open.
    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_connected()
    }
}

impl Inner {
    fn send_message(&self, message: &Message) -> Result<(), MonitorError> {
        if !self.transport.is_connected() {
            return Err(MonitorError::NotConnected);
        }
        let frame = self.codec.encode(message)?;
        debug!(frame, "sending");
        self.transport.send(&frame)?;
        Ok(())
    }

    /// Physical connection is up; open the conversation.
    fn handle_connected(&self) {
        debug!("connection established, starting handshake");
        if let Err(error) = self.send_message(&Message::StartCommunication) {
            warn!(%error, "handshake start failed");
            self.notify_error(ErrorCode::CommunicationFailed);
        }
    }

    fn handle_frame(&self, frame: &str) {
        let Some(message) = self.codec.decode(frame) else {
            return;
        };
        // Any decodable frame proves the device is alive, not just PING.
        self.watchdog.ping_received();

        match &message {
            Message::HardwareType { water_rower } => {
                if *water_rower {
                    if let Err(error) = self.send_message(&Message::RequestModelInformation) {
                        warn!(%error, "model information request failed");
                        self.notify_error(ErrorCode::CommunicationFailed);
                    }
                } else {
                    warn!(frame, "connected device is not a rowing monitor");
                    self.notify_error(ErrorCode::DeviceNotSupported);
                }
            }
            Message::ModelInformation(model) => self.handle_model_information(model),
            _ => {}
        }

        self.engine.dispatch(&message);
    }

    fn handle_model_information(&self, model: &ModelInformation) {
        if model.monitor_type() == MonitorType::Unknown {
            warn!(%model, "unsupported monitor model");
            self.notify_error(ErrorCode::DeviceNotSupported);
            return;
        }
        {
            let mut current = self.model.lock().unwrap();
            if current.is_some() {
                // The device repeats the reply sometimes; first one wins.
                return;
            }
            *current = Some(model.clone());
        }
        info!(%model, "handshake complete");

        self.watchdog.start();
        self.engine.start();
        for listener in self.listener_snapshot() {
            listener.on_connected(model);
        }
    }

    fn handle_disconnected(&self) {
        debug!("connection lost");
        self.watchdog.stop();
        self.engine.stop();
        *self.model.lock().unwrap() = None;
        for listener in self.listener_snapshot() {
            listener.on_disconnected();
        }
    }

    fn notify_error(&self, error: ErrorCode) {
        for listener in self.listener_snapshot() {
            listener.on_error(error);
        }
    }

    fn listener_snapshot(&self) -> Vec<Arc<dyn MonitorListener>> {
        self.listeners.read().unwrap().clone()
    }
}
