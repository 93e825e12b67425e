//! In-flight work counter
//!
//! Counts dispatched-but-unfinished work (outstanding sends, live pacers) and
//! lets waiters block until the count drops below a threshold. Waiters are
//! woken on every decrement and additionally re-check on a bounded interval.

use crate::error::{BenchError, BenchResult};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    count: AtomicUsize,
    notify: Notify,
}

/// Shared, cloneable in-flight counter
#[derive(Debug, Clone, Default)]
pub struct InFlightCounter {
    inner: Arc<Inner>,
}

impl InFlightCounter {
    /// Create a counter at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count
    pub fn get(&self) -> usize {
        self.inner.count.load(Ordering::SeqCst)
    }

    /// Whether nothing is in flight
    pub fn is_idle(&self) -> bool {
        self.get() == 0
    }

    /// Increment, returning the new count
    pub fn increment(&self) -> usize {
        self.inner.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Decrement, returning the new count
    ///
    /// A decrement without a matching increment leaves the counter at zero
    /// and returns an invariant error.
    pub fn decrement(&self) -> BenchResult<usize> {
        let result = self
            .inner
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match result {
            Ok(previous) => {
                self.inner.notify.notify_waiters();
                Ok(previous - 1)
            }
            Err(_) => {
                tracing::error!("In-flight counter decremented below zero");
                Err(BenchError::invariant(
                    "in-flight counter decremented without a matching increment",
                ))
            }
        }
    }

    /// Increment now and decrement when the returned guard is dropped
    pub fn track(&self) -> InFlightGuard {
        self.increment();
        InFlightGuard {
            counter: self.clone(),
        }
    }

    /// Wait until the count reaches zero
    pub async fn wait_idle(&self, poll_interval: Duration) {
        self.wait_below(1, poll_interval).await;
    }

    /// Wait until the count is strictly below `limit`
    pub async fn wait_below(&self, limit: usize, poll_interval: Duration) {
        loop {
            // Registered before the check so a decrement in between still wakes us.
            let notified = self.inner.notify.notified();
            if self.get() < limit {
                return;
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }
}

/// Decrements its counter on drop
#[derive(Debug)]
#[must_use = "dropping the guard immediately releases the in-flight slot"]
pub struct InFlightGuard {
    counter: InFlightCounter,
}

impl InFlightGuard {
    /// Release the slot now
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        // Paired with the increment in `track`, so this cannot underflow.
        let _ = self.counter.decrement();
    }
}
