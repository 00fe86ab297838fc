use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use super::lock::{lock_mutex, wait_timeout};

/// Cancellation token shared between a loop and whoever owns its lifetime.
///
/// Long sleeps go through `wait_timeout` so `stop()` interrupts them instead
/// of waiting for the sleep to run out.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        let mut stopped = lock_mutex(&self.stopped, "StopSignal::stop");
        *stopped = true;
        self.condvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *lock_mutex(&self.stopped, "StopSignal::is_stopped")
    }

    /// Sleeps up to `duration`. Returns `true` if the signal fired.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut stopped = lock_mutex(&self.stopped, "StopSignal::wait_timeout");
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = wait_timeout(
                &self.condvar,
                stopped,
                deadline - now,
                "StopSignal::wait_timeout",
            );
            stopped = guard;
        }
        true
    }
}
