//! End-to-end tests for the connection orchestrator over an in-memory
//! transport.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::runtime::Handle;

use oarlock_core::error::MonitorError;
use oarlock_core::model::{ErrorCode, ModelInformation, MonitorType};
use oarlock_core::monitor::{MonitorConfig, MonitorListener, RowingMonitor};
use oarlock_core::protocol::message::{Memory, Message};
use oarlock_core::subscription::MemorySubscription;
use oarlock_core::transport::{Transport, TransportError, TransportListener};

/// In-memory transport that records outbound frames and lets tests inject
/// device behavior.
#[derive(Default)]
struct MockTransport {
    connected: AtomicBool,
    fail_open: AtomicBool,
    fail_send: AtomicBool,
    open_calls: AtomicUsize,
    close_calls: AtomicUsize,
    sent: Mutex<Vec<String>>,
    listener: Mutex<Option<Arc<dyn TransportListener>>>,
}

impl MockTransport {
    fn listener(&self) -> Arc<dyn TransportListener> {
        self.listener
            .lock()
            .unwrap()
            .clone()
            .expect("listener registered")
    }

    /// Deliver one frame as if the device had sent it.
    fn feed(&self, frame: &str) {
        self.listener().on_frame(frame);
    }

    fn fail_io(&self) {
        self.listener().on_error();
    }

    fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.listener().on_disconnected();
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    fn open(&self, _address: &str) -> Result<(), TransportError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(TransportError::Serial("no such port".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        self.listener().on_connected();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send(&self, frame: &str) -> Result<(), TransportError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(TransportError::Serial("write failed".to_string()));
        }
        self.sent.lock().unwrap().push(frame.to_owned());
        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.drop_connection();
        Ok(())
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) {
        *self.listener.lock().unwrap() = Some(listener);
    }
}

#[derive(Default)]
struct RecordingListener {
    connected: Mutex<Vec<ModelInformation>>,
    disconnects: AtomicUsize,
    errors: Mutex<Vec<ErrorCode>>,
}

impl RecordingListener {
    fn errors(&self) -> Vec<ErrorCode> {
        self.errors.lock().unwrap().clone()
    }
}

impl MonitorListener for RecordingListener {
    fn on_connected(&self, model: &ModelInformation) {
        self.connected.lock().unwrap().push(model.clone());
    }

    fn on_disconnected(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, error: ErrorCode) {
        self.errors.lock().unwrap().push(error);
    }
}

fn setup(config: MonitorConfig) -> (Arc<MockTransport>, RowingMonitor, Arc<RecordingListener>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let transport = Arc::new(MockTransport::default());
    let monitor = RowingMonitor::new(
        Arc::clone(&transport) as Arc<dyn Transport>,
        config,
        Handle::current(),
    );
    let listener = Arc::new(RecordingListener::default());
    monitor.add_listener(Arc::clone(&listener) as Arc<dyn MonitorListener>);
    (transport, monitor, listener)
}

/// Run the full handshake up to the model information reply.
fn handshake(transport: &MockTransport, monitor: &RowingMonitor) {
    monitor.connect("/dev/ttyUSB0").expect("connect");
    transport.feed("_WR_");
    transport.feed("IV40200");
}

#[tokio::test]
async fn connect_rejects_empty_address() {
    let (transport, monitor, _listener) = setup(MonitorConfig::default());

    let result = monitor.connect("");
    assert!(matches!(result, Err(MonitorError::InvalidArgument(_))));
    assert_eq!(transport.open_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn connect_twice_is_an_error() {
    let (_transport, monitor, _listener) = setup(MonitorConfig::default());

    monitor.connect("/dev/ttyUSB0").expect("first connect");
    let result = monitor.connect("/dev/ttyUSB0");
    assert!(matches!(result, Err(MonitorError::AlreadyConnected)));
}

#[tokio::test]
async fn failed_open_is_reported_to_listeners() {
    let (transport, monitor, listener) = setup(MonitorConfig::default());
    transport.fail_open.store(true, Ordering::SeqCst);

    monitor.connect("/dev/ttyUSB0").expect("connect returns normally");

    assert_eq!(listener.errors(), vec![ErrorCode::CommunicationFailed]);
    assert!(!monitor.is_connected());
}

#[tokio::test]
async fn handshake_completes() {
    let (transport, monitor, listener) = setup(MonitorConfig::default());

    monitor.connect("/dev/ttyUSB0").expect("connect");
    assert_eq!(transport.sent(), vec!["USB"]);

    transport.feed("_WR_");
    assert_eq!(transport.sent(), vec!["USB", "IV?"]);
    assert!(listener.connected.lock().unwrap().is_empty());

    transport.feed("IV40200");
    let connected = listener.connected.lock().unwrap();
    assert_eq!(connected.len(), 1);
    assert_eq!(connected[0].monitor_type(), MonitorType::S4);
    assert_eq!(connected[0].firmware_version(), "02.00");
    drop(connected);

    let model = monitor.model_information().expect("model stored");
    assert_eq!(model.monitor_type(), MonitorType::S4);
    assert!(listener.errors().is_empty());
}

#[tokio::test]
async fn repeated_model_information_is_ignored() {
    let (transport, monitor, listener) = setup(MonitorConfig::default());
    handshake(&transport, &monitor);

    transport.feed("IV40200");
    assert_eq!(listener.connected.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn foreign_hardware_reports_device_not_supported() {
    let (transport, monitor, listener) = setup(MonitorConfig::default());

    monitor.connect("/dev/ttyUSB0").expect("connect");
    transport.feed("_XX_");

    assert_eq!(listener.errors(), vec![ErrorCode::DeviceNotSupported]);
    // No model information request for a device that is not a monitor.
    assert_eq!(transport.sent(), vec!["USB"]);
}

#[tokio::test]
async fn unknown_model_reports_device_not_supported() {
    let (transport, monitor, listener) = setup(MonitorConfig::default());

    monitor.connect("/dev/ttyUSB0").expect("connect");
    transport.feed("_WR_");
    transport.feed("IV10200");

    assert_eq!(listener.errors(), vec![ErrorCode::DeviceNotSupported]);
    assert!(listener.connected.lock().unwrap().is_empty());
    assert_eq!(monitor.model_information(), None);
}

#[tokio::test(start_paused = true)]
async fn polling_starts_after_handshake() {
    let (transport, monitor, _listener) = setup(MonitorConfig::default());

    let values = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&values);
    monitor.subscribe(Arc::new(MemorySubscription::new(
        Memory::Single,
        0x057,
        move |value| sink.lock().unwrap().push(value),
    )));

    monitor.connect("/dev/ttyUSB0").expect("connect");
    tokio::time::sleep(Duration::from_millis(10)).await;
    // Not handshaken yet, so no polls.
    assert_eq!(transport.sent(), vec!["USB"]);

    transport.feed("_WR_");
    transport.feed("IV40200");
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(transport.sent(), vec!["USB", "IV?", "IRS057"]);

    transport.feed("IDS05716");
    assert_eq!(*values.lock().unwrap(), vec![0x16]);
}

#[tokio::test]
async fn disconnect_sends_exit_then_closes() {
    let (transport, monitor, listener) = setup(MonitorConfig::default());
    handshake(&transport, &monitor);

    monitor.disconnect().expect("disconnect");

    assert_eq!(transport.sent(), vec!["USB", "IV?", "EXIT"]);
    assert_eq!(transport.close_calls.load(Ordering::SeqCst), 1);
    assert_eq!(listener.disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(monitor.model_information(), None);
    assert!(listener.errors().is_empty());
}

#[tokio::test]
async fn disconnect_closes_even_if_exit_fails() {
    let (transport, monitor, listener) = setup(MonitorConfig::default());
    handshake(&transport, &monitor);
    transport.fail_send.store(true, Ordering::SeqCst);

    monitor.disconnect().expect("disconnect");

    assert_eq!(listener.errors(), vec![ErrorCode::CommunicationFailed]);
    assert_eq!(transport.close_calls.load(Ordering::SeqCst), 1);
    assert_eq!(listener.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn disconnect_without_connection_is_an_error() {
    let (_transport, monitor, _listener) = setup(MonitorConfig::default());

    let result = monitor.disconnect();
    assert!(matches!(result, Err(MonitorError::NotConnected)));
}

#[tokio::test]
async fn reset_requires_a_connection() {
    let (transport, monitor, _listener) = setup(MonitorConfig::default());

    let result = monitor.perform_reset();
    assert!(matches!(result, Err(MonitorError::NotConnected)));

    monitor.connect("/dev/ttyUSB0").expect("connect");
    monitor.perform_reset().expect("reset");
    assert_eq!(transport.sent(), vec!["USB", "RESET"]);
}

#[tokio::test]
async fn sending_an_inbound_message_is_rejected() {
    let (_transport, monitor, _listener) = setup(MonitorConfig::default());

    monitor.connect("/dev/ttyUSB0").expect("connect");
    let result = monitor.send_message(&Message::Ping);
    assert!(matches!(result, Err(MonitorError::Protocol(_))));
}

#[tokio::test]
async fn transport_error_is_forwarded() {
    let (transport, monitor, listener) = setup(MonitorConfig::default());
    handshake(&transport, &monitor);

    transport.fail_io();
    assert_eq!(listener.errors(), vec![ErrorCode::CommunicationFailed]);
}

#[tokio::test]
async fn lost_connection_is_forwarded() {
    let (transport, monitor, listener) = setup(MonitorConfig::default());
    handshake(&transport, &monitor);

    transport.drop_connection();
    assert_eq!(listener.disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(monitor.model_information(), None);
    assert!(!monitor.is_connected());
}

#[tokio::test(start_paused = true)]
async fn silent_device_reports_timeout() {
    let config = MonitorConfig {
        ping_timeout: Duration::from_millis(100),
        ..MonitorConfig::default()
    };
    let (transport, monitor, listener) = setup(config);
    handshake(&transport, &monitor);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(listener.errors(), vec![ErrorCode::Timeout]);

    // Any frame counts as a sign of life, so the next check passes.
    transport.feed("PING");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(listener.errors(), vec![ErrorCode::Timeout]);
}

#[tokio::test]
async fn removed_listener_receives_no_events() {
    let (transport, monitor, listener) = setup(MonitorConfig::default());

    let removable: Arc<dyn MonitorListener> = Arc::new(RecordingListener::default());
    monitor.add_listener(Arc::clone(&removable));
    monitor.remove_listener(&removable);

    handshake(&transport, &monitor);
    assert_eq!(listener.connected.lock().unwrap().len(), 1);
}
