//! Liveness watchdog.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

/// Detects a silently failed device or link.
///
/// While active exactly one check is pending. Every check clears the
/// recorded-signal flag and reschedules itself; the timeout callback fires
/// only for checks that found no signal since the previous one.
pub struct PingWatchdog {
    interval: Duration,
    handle: Handle,
    active: Arc<AtomicBool>,
    ping_seen: Arc<AtomicBool>,
    on_timeout: Arc<dyn Fn() + Send + Sync>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PingWatchdog {
    /// Create a watchdog that invokes `on_timeout` whenever `interval`
    /// passes without a liveness signal. Checks run on the runtime behind
    /// `handle`.
    pub fn new(
        interval: Duration,
        handle: Handle,
        on_timeout: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            interval,
            handle,
            active: Arc::new(AtomicBool::new(false)),
            ping_seen: Arc::new(AtomicBool::new(false)),
            on_timeout: Arc::new(on_timeout),
            task: Mutex::new(None),
        }
    }

    /// Schedule the first check after the configured interval.
    pub fn start(&self) {
        if self.active.swap(true, Ordering::SeqCst) {
            return;
        }
        self.ping_seen.store(false, Ordering::SeqCst);
        debug!(interval_ms = self.interval.as_millis() as u64, "watchdog started");

        let active = Arc::clone(&self.active);
        let ping_seen = Arc::clone(&self.ping_seen);
        let on_timeout = Arc::clone(&self.on_timeout);
        let interval = self.interval;

        let task = self.handle.spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if !active.load(Ordering::SeqCst) {
                    break;
                }
                if !ping_seen.swap(false, Ordering::SeqCst) {
                    debug!("no liveness signal within interval");
                    on_timeout();
                }
            }
        });
        *self.task.lock().unwrap() = Some(task);
    }

    /// Record that the device showed a sign of life. Idempotent between
    /// checks.
    pub fn ping_received(&self) {
        self.ping_seen.store(true, Ordering::SeqCst);
    }

    /// Cancel the pending check and deactivate. A check that already fired
    /// completes, but no timeout is reported after stop has taken effect.
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
            debug!("watchdog stopped");
        }
    }

    /// Whether the watchdog is currently active.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
