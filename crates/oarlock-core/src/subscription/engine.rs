//! Subscription polling and dispatch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Subscription;
use crate::error::MonitorError;
use crate::protocol::message::Message;

/// Sink for outbound poll messages, implemented by the connection
/// orchestrator.
pub trait MessageSender: Send + Sync {
    /// Encode and transmit one outbound message.
    fn send_message(&self, message: &Message) -> Result<(), MonitorError>;
}

/// Polls registered subscriptions at a fixed interval and fans inbound
/// messages out to them.
///
/// The subscription set is copy-on-write: ticks and dispatch iterate over a
/// snapshot, so `subscribe`/`unsubscribe` are safe at any time, including
/// from inside a handler. Both polling and dispatch visit subscriptions in
/// registration order.
pub struct SubscriptionEngine {
    interval: Duration,
    handle: Handle,
    sender: Arc<dyn MessageSender>,
    subscriptions: Arc<RwLock<Vec<Arc<dyn Subscription>>>>,
    running: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionEngine {
    /// Create an engine that ticks every `interval` on the runtime behind
    /// `handle` and sends poll messages through `sender`.
    pub fn new(interval: Duration, sender: Arc<dyn MessageSender>, handle: Handle) -> Self {
        Self {
            interval,
            handle,
            sender,
            subscriptions: Arc::new(RwLock::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Begin periodic polling; the first tick runs immediately.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(interval_ms = self.interval.as_millis() as u64, "polling started");

        let sender = Arc::clone(&self.sender);
        let running = Arc::clone(&self.running);
        let subscriptions = Arc::clone(&self.subscriptions);
        let interval = self.interval;

        let task = self.handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let snapshot: Vec<_> = subscriptions.read().unwrap().clone();
                for subscription in snapshot {
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    let Some(message) = subscription.poll() else {
                        continue;
                    };
                    // One failing send must not starve the other
                    // subscriptions of this tick.
                    if let Err(error) = sender.send_message(&message) {
                        warn!(%error, "poll send failed");
                    }
                }
            }
        });
        *self.task.lock().unwrap() = Some(task);
    }

    /// Stop polling. The abort lands on the timer await, so a tick that is
    /// already executing runs to completion.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
            debug!("polling stopped");
        }
    }

    /// Whether the engine is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Add a subscription to the live set.
    pub fn subscribe(&self, subscription: Arc<dyn Subscription>) {
        self.subscriptions.write().unwrap().push(subscription);
    }

    /// Remove a previously registered subscription.
    pub fn unsubscribe(&self, subscription: &Arc<dyn Subscription>) {
        self.subscriptions
            .write()
            .unwrap()
            .retain(|s| !Arc::ptr_eq(s, subscription));
    }

    /// Offer one inbound message to every subscription, in registration
    /// order. Ignored while the engine is stopped.
    pub fn dispatch(&self, message: &Message) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        let snapshot: Vec<_> = self.subscriptions.read().unwrap().clone();
        for subscription in snapshot {
            subscription.on_message(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::{Memory, StrokeType};
    use crate::subscription::{MemorySubscription, StrokeSubscription};
    use std::sync::atomic::AtomicUsize;

    /// Records sent messages; optionally fails every send.
    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<Message>>,
        fail: AtomicBool,
    }

    impl MessageSender for RecordingSender {
        fn send_message(&self, message: &Message) -> Result<(), MonitorError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(MonitorError::NotConnected);
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    /// Fails the first `failures` sends, records the rest.
    struct FlakySender {
        failures: AtomicUsize,
        sent: Mutex<Vec<Message>>,
    }

    impl MessageSender for FlakySender {
        fn send_message(&self, message: &Message) -> Result<(), MonitorError> {
            if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n > 0).then(|| n - 1)
            }).is_ok()
            {
                return Err(MonitorError::NotConnected);
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    async fn settle() {
        // Let spawned tasks run; the paused clock advances through sleeps.
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn push_only_subscription_never_sends() {
        let sender = Arc::new(RecordingSender::default());
        let engine = SubscriptionEngine::new(
            Duration::from_millis(10),
            Arc::clone(&sender) as Arc<dyn MessageSender>,
            Handle::current(),
        );

        let strokes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&strokes);
        engine.subscribe(Arc::new(StrokeSubscription::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        engine.start();
        tokio::time::sleep(Duration::from_millis(35)).await;

        assert!(sender.sent.lock().unwrap().is_empty());

        engine.dispatch(&Message::Stroke(StrokeType::Start));
        assert_eq!(strokes.load(Ordering::SeqCst), 1);

        engine.stop();
        engine.dispatch(&Message::Stroke(StrokeType::End));
        assert_eq!(strokes.load(Ordering::SeqCst), 1, "stopped engine must not dispatch");
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_is_immediate() {
        let sender = Arc::new(RecordingSender::default());
        let engine = SubscriptionEngine::new(
            Duration::from_secs(3600),
            Arc::clone(&sender) as Arc<dyn MessageSender>,
            Handle::current(),
        );
        engine.subscribe(Arc::new(MemorySubscription::new(Memory::Single, 0x057, |_| {})));

        engine.start();
        settle().await;

        assert_eq!(sender.sent.lock().unwrap().len(), 1);
        engine.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn failing_send_does_not_block_later_subscriptions() {
        let sender = Arc::new(FlakySender {
            failures: AtomicUsize::new(1),
            sent: Mutex::new(Vec::new()),
        });
        let engine = SubscriptionEngine::new(
            Duration::from_secs(3600),
            Arc::clone(&sender) as Arc<dyn MessageSender>,
            Handle::current(),
        );
        engine.subscribe(Arc::new(MemorySubscription::new(Memory::Single, 0x001, |_| {})));
        engine.subscribe(Arc::new(MemorySubscription::new(Memory::Double, 0x002, |_| {})));

        engine.start();
        settle().await;

        // First subscription's send failed, the second still went out in
        // the same tick.
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let Message::ReadMemory(read) = &sent[0] else {
            panic!("expected a read request");
        };
        assert_eq!(read.location, 0x002);
        drop(sent);
        engine.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn polls_repeat_at_interval() {
        let sender = Arc::new(RecordingSender::default());
        let engine = SubscriptionEngine::new(
            Duration::from_millis(10),
            Arc::clone(&sender) as Arc<dyn MessageSender>,
            Handle::current(),
        );
        engine.subscribe(Arc::new(MemorySubscription::new(Memory::Triple, 0x100, |_| {})));

        engine.start();
        tokio::time::sleep(Duration::from_millis(25)).await;
        engine.stop();

        // Immediate tick plus ticks at 10 ms and 20 ms.
        assert_eq!(sender.sent.lock().unwrap().len(), 3);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            sender.sent.lock().unwrap().len(),
            3,
            "no polls after stop"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribe_removes_only_that_subscription() {
        let sender = Arc::new(RecordingSender::default());
        let engine = SubscriptionEngine::new(
            Duration::from_millis(10),
            Arc::clone(&sender) as Arc<dyn MessageSender>,
            Handle::current(),
        );
        let first: Arc<dyn Subscription> =
            Arc::new(MemorySubscription::new(Memory::Single, 0x001, |_| {}));
        let second: Arc<dyn Subscription> =
            Arc::new(MemorySubscription::new(Memory::Single, 0x002, |_| {}));
        engine.subscribe(Arc::clone(&first));
        engine.subscribe(Arc::clone(&second));
        engine.unsubscribe(&first);

        engine.start();
        settle().await;
        engine.stop();

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let Message::ReadMemory(read) = &sent[0] else {
            panic!("expected a read request");
        };
        assert_eq!(read.location, 0x002);
    }
}
