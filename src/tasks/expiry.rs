//! TTL Expiry Task
//!
//! Single background task that fires TTL deadlines for one cache.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error};

/// Something holding TTL deadlines the expiry task can drive.
pub trait ExpiryDriven: Send + Sync + 'static {
    /// Expires every entry due at `now` and returns the next pending deadline.
    fn expire_due(&self, now: Instant) -> Option<Instant>;
}

/// Spawns the task that fires deadlines of `target` as they come due.
///
/// The task sleeps until the next deadline reported by
/// [`ExpiryDriven::expire_due`], or until `wakeup` is notified because an
/// earlier deadline was armed. It holds only a weak reference, so it ends on
/// its own once the target is dropped and `wakeup` is notified one last time.
///
/// Must be called from within a tokio runtime.
///
/// # Example
/// ```ignore
/// let wakeup = Arc::new(Notify::new());
/// let handle = spawn_expiry_task(Arc::downgrade(&inner), wakeup.clone());
/// // Later, after an earlier deadline was armed:
/// wakeup.notify_one();
/// ```
pub fn spawn_expiry_task<T: ExpiryDriven>(target: Weak<T>, wakeup: Arc<Notify>) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("Starting TTL expiry task");

        loop {
            let next = match target.upgrade() {
                Some(target) => fire_due(target.as_ref()),
                None => break,
            };

            match next {
                Some(deadline) => {
                    tokio::select! {
                        _ = sleep_until(deadline) => {}
                        _ = wakeup.notified() => {}
                    }
                }
                None => wakeup.notified().await,
            }
        }

        debug!("TTL expiry task stopped: cache dropped");
    })
}

/// A panicking hook must not take the expiry task down with it.
fn fire_due<T: ExpiryDriven>(target: &T) -> Option<Instant> {
    match catch_unwind(AssertUnwindSafe(|| target.expire_due(Instant::now()))) {
        Ok(next) => next,
        Err(_) => {
            error!("Expiration hook panicked, remaining notifications of the batch were dropped");
            // Poll again right away, the guard was already released
            Some(Instant::now())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Scripted {
        calls: AtomicUsize,
        deadlines: Mutex<VecDeque<Instant>>,
        panic_on_first: bool,
    }

    impl ExpiryDriven for Scripted {
        fn expire_due(&self, _now: Instant) -> Option<Instant> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panic_on_first && call == 0 {
                panic!("hook failure");
            }
            self.deadlines.lock().pop_front()
        }
    }

    fn calls(target: &Scripted) -> usize {
        target.calls.load(Ordering::SeqCst)
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_sleeps_until_each_deadline() {
        let start = Instant::now();
        let target = Arc::new(Scripted::default());
        target.deadlines.lock().extend([
            start + Duration::from_millis(50),
            start + Duration::from_millis(100),
        ]);
        let wakeup = Arc::new(Notify::new());

        let handle = spawn_expiry_task(Arc::downgrade(&target), wakeup.clone());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls(&target), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls(&target), 2);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls(&target), 3);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_wakes_on_notify() {
        let target = Arc::new(Scripted::default());
        let wakeup = Arc::new(Notify::new());

        let handle = spawn_expiry_task(Arc::downgrade(&target), wakeup.clone());
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(calls(&target), 1);

        // No deadline pending: only a notification wakes the task
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls(&target), 1);

        wakeup.notify_one();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(calls(&target), 2);

        handle.abort();
    }

    #[tokio::test]
    async fn test_task_stops_when_target_dropped() {
        let target = Arc::new(Scripted::default());
        let wakeup = Arc::new(Notify::new());

        let handle = spawn_expiry_task(Arc::downgrade(&target), wakeup.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;

        drop(target);
        wakeup.notify_one();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("task should stop once the target is gone")
            .expect("task should not panic");
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_survives_panicking_target() {
        let target = Arc::new(Scripted {
            panic_on_first: true,
            ..Default::default()
        });
        let wakeup = Arc::new(Notify::new());

        let handle = spawn_expiry_task(Arc::downgrade(&target), wakeup.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;

        // First call panicked, the task polled again and is now idle
        assert_eq!(calls(&target), 2);
        assert!(!handle.is_finished());

        handle.abort();
    }
}
