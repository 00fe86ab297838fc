use std::sync::{Condvar, Mutex, MutexGuard, WaitTimeoutResult};
use std::time::Duration;

fn log_poisoned(lock_type: &str, context: &str) {
    log::error!("{} lock poisoned in {}", lock_type, context);
}

pub fn lock_mutex<'a, T>(mutex: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log_poisoned("Mutex", context);
            poisoned.into_inner()
        }
    }
}

/// Condvar wait that survives a poisoned mutex the same way `lock_mutex` does.
pub fn wait_timeout<'a, T>(
    condvar: &Condvar,
    guard: MutexGuard<'a, T>,
    timeout: Duration,
    context: &str,
) -> (MutexGuard<'a, T>, WaitTimeoutResult) {
    match condvar.wait_timeout(guard, timeout) {
        Ok(pair) => pair,
        Err(poisoned) => {
            log_poisoned("Condvar", context);
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn poisoned_mutex_is_recovered() {
        let m = Arc::new(Mutex::new(5));
        let m2 = m.clone();
        let _ = std::thread::spawn(move || {
            let _g = m2.lock().unwrap();
            panic!("poison it");
        })
        .join();

        assert!(m.is_poisoned());
        assert_eq!(*lock_mutex(&m, "test"), 5);
    }

    #[test]
    fn wait_timeout_returns_after_deadline() {
        let m = Mutex::new(());
        let cv = Condvar::new();
        let guard = lock_mutex(&m, "test");
        let (_guard, res) = wait_timeout(&cv, guard, Duration::from_millis(10), "test");
        assert!(res.timed_out());
    }
}
