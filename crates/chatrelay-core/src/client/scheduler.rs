//! Reconnect timer
//!
//! Holds at most one pending timer. Scheduling again replaces the pending
//! timer instead of stacking a second one.

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ReconnectScheduler {
    pending: Option<JoinHandle<()>>,
}

impl ReconnectScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `on_due` after `delay`, cancelling any pending timer first.
    pub fn schedule<F>(&mut self, delay: Duration, on_due: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.cancel() {
            debug!("Replacing pending reconnect timer");
        }
        debug!("Reconnect scheduled in {:?}", delay);
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_due();
        }));
    }

    /// Cancel the pending timer. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ReconnectScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let make = move || {
            let c = Arc::clone(&c);
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }) as Box<dyn FnOnce() + Send>
        };
        (count, make)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_delay() {
        let (count, make) = counter();
        let mut scheduler = ReconnectScheduler::new();
        scheduler.schedule(Duration::from_secs(5), make());
        assert!(scheduler.is_pending());

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_replaces_pending_timer() {
        let (count, make) = counter();
        let mut scheduler = ReconnectScheduler::new();
        scheduler.schedule(Duration::from_secs(5), make());
        scheduler.schedule(Duration::from_secs(5), make());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let (count, make) = counter();
        let mut scheduler = ReconnectScheduler::new();
        scheduler.schedule(Duration::from_secs(5), make());
        assert!(scheduler.cancel());
        assert!(!scheduler.cancel());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
