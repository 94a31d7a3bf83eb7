//! Cancellable repeating background task.
//!
//! Every periodic probe (VPN status, server health, session refresh, egress
//! metrics and the diagnostics timer) runs on a [`Poller`]. The probe is
//! invoked once immediately and then every `interval` on a dedicated worker
//! thread; results come back over an MPSC channel the owner drains on its own
//! thread, so each snapshot keeps exactly one writer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, warn};

/// Progress of one probe cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent<T> {
    /// A cycle began; the previous result is now stale.
    Started,
    /// A cycle completed with a fresh result.
    Finished(T),
}

/// Handle to a running repeating task.
///
/// Dropping the handle stops the task.
pub struct Poller<T> {
    name: &'static str,
    active: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    events: Receiver<PollEvent<T>>,
}

impl<T: Send + 'static> Poller<T> {
    /// Starts `probe` now and then every `interval` until stopped.
    pub fn spawn<F>(name: &'static str, interval: Duration, mut probe: F) -> Self
    where
        F: FnMut() -> T + Send + 'static,
    {
        let (event_tx, events) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let active = Arc::new(AtomicBool::new(true));
        let worker_active = Arc::clone(&active);

        let spawned = thread::Builder::new()
            .name(format!("poll-{name}"))
            .spawn(move || loop {
                if !worker_active.load(Ordering::SeqCst)
                    || event_tx.send(PollEvent::Started).is_err()
                {
                    break;
                }

                let result = probe();

                // Late results from a cycle that outlived stop() are dropped.
                if !worker_active.load(Ordering::SeqCst)
                    || event_tx.send(PollEvent::Finished(result)).is_err()
                {
                    break;
                }

                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });

        if let Err(e) = spawned {
            warn!("SCHED: failed to start poller {name}: {e}");
            active.store(false, Ordering::SeqCst);
        } else {
            debug!("SCHED: poller {name} started ({}ms)", interval.as_millis());
        }

        Self {
            name,
            active,
            stop_tx: Some(stop_tx),
            events,
        }
    }

    /// Next pending event, if any.
    pub fn try_next(&self) -> Option<PollEvent<T>> {
        if !self.is_running() {
            return None;
        }
        self.events.try_recv().ok()
    }

    /// Blocks up to `timeout` for the next event.
    pub fn next_timeout(&self, timeout: Duration) -> Option<PollEvent<T>> {
        if !self.is_running() {
            return None;
        }
        self.events.recv_timeout(timeout).ok()
    }

    /// All pending events, oldest first.
    pub fn drain(&self) -> Vec<PollEvent<T>> {
        if !self.is_running() {
            return Vec::new();
        }
        self.events.try_iter().collect()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stops the task. No further cycle starts and no result produced after
    /// this call is ever delivered.
    pub fn stop(&mut self) {
        if self.active.swap(false, Ordering::SeqCst) {
            debug!("SCHED: poller {} stopped", self.name);
        }
        // Disconnecting wakes the worker out of its interval wait.
        self.stop_tx.take();
    }
}

impl<T> Drop for Poller<T> {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        self.stop_tx.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn wait_finished<T: Send + 'static>(poller: &Poller<T>) -> Option<T> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Some(PollEvent::Finished(v)) = poller.next_timeout(Duration::from_millis(50)) {
                return Some(v);
            }
        }
        None
    }

    #[test]
    fn test_runs_immediately() {
        let poller = Poller::spawn("test", Duration::from_secs(60), || 42);
        assert_eq!(poller.next_timeout(Duration::from_secs(2)), Some(PollEvent::Started));
        assert_eq!(wait_finished(&poller), Some(42));
    }

    #[test]
    fn test_repeats_on_interval() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let poller = Poller::spawn("repeat", Duration::from_millis(20), move || {
            c.fetch_add(1, Ordering::SeqCst)
        });

        assert_eq!(wait_finished(&poller), Some(0));
        assert_eq!(wait_finished(&poller), Some(1));
        assert_eq!(wait_finished(&poller), Some(2));
    }

    #[test]
    fn test_stop_prevents_further_invocations() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let mut poller = Poller::spawn("stop", Duration::from_millis(10), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        wait_finished(&poller);
        poller.stop();
        // Let any cycle that was already running settle.
        thread::sleep(Duration::from_millis(50));
        let after_stop = counter.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));

        assert_eq!(counter.load(Ordering::SeqCst), after_stop);
        assert!(!poller.is_running());
        assert!(poller.try_next().is_none());
    }

    #[test]
    fn test_in_flight_result_discarded_after_stop() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let mut poller = Poller::spawn("inflight", Duration::from_secs(60), move || {
            let _ = release_rx.recv_timeout(Duration::from_secs(2));
            "late"
        });
        assert_eq!(poller.next_timeout(Duration::from_secs(2)), Some(PollEvent::Started));

        poller.stop();
        let _ = release_tx.send(());
        thread::sleep(Duration::from_millis(50));

        assert!(poller.drain().is_empty());
    }

    #[test]
    fn test_drop_stops_worker() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let poller = Poller::spawn("drop", Duration::from_millis(10), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        wait_finished(&poller);
        drop(poller);
        thread::sleep(Duration::from_millis(50));
        let settled = counter.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(counter.load(Ordering::SeqCst), settled);
    }
}
