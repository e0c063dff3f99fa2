//! Resettable one-shot timer behind the writer's auto-flush.
//!
//! Each armed deadline carries the writer's epoch at the time it was armed.
//! Re-arming replaces the deadline, cancelling clears it, and the callback
//! receives the epoch so the writer can ignore firings that a later write or
//! flush has made stale.
//!
//! The worker thread is started on first use and shut down when the timer is
//! dropped.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

type FireFn = dyn Fn(u64) + Send + Sync;

pub(crate) struct FlushTimer {
    shared: Arc<TimerShared>,
    fire: Arc<FireFn>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct TimerShared {
    slot: Mutex<Slot>,
    wake: Condvar,
}

#[derive(Default)]
struct Slot {
    /// When to fire, and with which epoch.
    deadline: Option<(Instant, u64)>,
    shutdown: bool,
}

impl TimerShared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, fire: &FireFn) {
        let mut slot = self.lock();
        loop {
            if slot.shutdown {
                return;
            }
            let deadline = slot.deadline;
            match deadline {
                None => {
                    slot = self.wake.wait(slot).unwrap_or_else(PoisonError::into_inner);
                }
                Some((at, epoch)) => {
                    let now = Instant::now();
                    if now >= at {
                        slot.deadline = None;
                        drop(slot);
                        fire(epoch);
                        slot = self.lock();
                    } else {
                        slot = self
                            .wake
                            .wait_timeout(slot, at - now)
                            .unwrap_or_else(PoisonError::into_inner)
                            .0;
                    }
                }
            }
        }
    }
}

impl FlushTimer {
    pub(crate) fn new(fire: impl Fn(u64) + Send + Sync + 'static) -> Self {
        Self {
            shared: Arc::new(TimerShared {
                slot: Mutex::new(Slot::default()),
                wake: Condvar::new(),
            }),
            fire: Arc::new(fire),
            worker: Mutex::new(None),
        }
    }

    /// Fire once after `delay`, replacing any deadline already armed.
    pub(crate) fn arm(&self, epoch: u64, delay: Duration) {
        {
            let mut slot = self.shared.lock();
            slot.deadline = Some((Instant::now() + delay, epoch));
        }
        self.shared.wake.notify_one();
        self.ensure_worker();
    }

    /// Drop the armed deadline, if any.
    pub(crate) fn cancel(&self) {
        let mut slot = self.shared.lock();
        if slot.deadline.take().is_some() {
            self.shared.wake.notify_one();
        }
    }

    /// Check if a deadline is armed.
    pub(crate) fn is_armed(&self) -> bool {
        self.shared.lock().deadline.is_some()
    }

    #[cfg(test)]
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.shared.lock().deadline.map(|(at, _)| at)
    }

    fn ensure_worker(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let fire = Arc::clone(&self.fire);
        match std::thread::Builder::new()
            .name("masked-io-flush".to_string())
            .spawn(move || shared.run(&*fire))
        {
            Ok(handle) => *worker = Some(handle),
            Err(e) => {
                // Held data still leaves on the next write or flush.
                tracing::warn!(error = %e, "failed to start auto-flush worker");
            }
        }
    }
}

impl Drop for FlushTimer {
    fn drop(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.wake.notify_all();

        let handle = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::warn!("auto-flush worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn channel_timer() -> (FlushTimer, mpsc::Receiver<u64>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let timer = FlushTimer::new(move |epoch| {
            let _ = tx.lock().unwrap().send(epoch);
        });
        (timer, rx)
    }

    #[test]
    fn fires_once_with_epoch() {
        let (timer, rx) = channel_timer();
        timer.arm(7, Duration::from_millis(1));

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(7));
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        assert!(!timer.is_armed());
    }

    #[test]
    fn rearm_replaces_deadline() {
        let (timer, rx) = channel_timer();
        timer.arm(1, Duration::from_secs(60));
        timer.arm(2, Duration::from_millis(1));

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(2));
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn cancel_prevents_firing() {
        let (timer, rx) = channel_timer();
        timer.arm(3, Duration::from_millis(100));
        timer.cancel();

        assert!(!timer.is_armed());
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn drop_without_arming_does_not_block() {
        let (timer, _rx) = channel_timer();
        drop(timer);
    }

    #[test]
    fn drop_joins_worker() {
        let (timer, _rx) = channel_timer();
        timer.arm(1, Duration::from_secs(60));
        drop(timer);
    }
}
