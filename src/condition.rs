use super::Result;
use crate::error::HarnessError;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Default)]
struct Inner {
    completed: Mutex<bool>,
    signal: Condvar,
    async_signal: Notify,
}

/// A one-shot completion flag tests can block on.
///
/// Clone the handle into a callback, call [`Condition::notify`] from there,
/// and [`Condition::wait`] in the test body. The flag stays set until
/// [`Condition::reset`], so a notify that lands before the wait is not lost.
#[derive(Debug, Clone, Default)]
pub struct Condition {
    inner: Arc<Inner>,
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking notifier must not wedge every later wait.
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.inner
            .completed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Blocks until notified or `timeout` elapses.
    ///
    /// Returns immediately if already notified. On timeout the error is a
    /// [`HarnessError::ConditionTimeout`].
    pub fn wait(&self, timeout: Duration) -> Result<()> {
        let guard = self.lock();
        if *guard {
            return Ok(());
        }

        let (_guard, result) = self
            .inner
            .signal
            .wait_timeout_while(guard, timeout, |completed| !*completed)
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if result.timed_out() {
            debug!("condition wait timed out after {:?}", timeout);
            return Err(HarnessError::ConditionTimeout(timeout).into());
        }
        Ok(())
    }

    /// [`Condition::wait`] that fails the test on timeout
    #[track_caller]
    pub fn assert_notified(&self, timeout: Duration) {
        if let Err(e) = self.wait(timeout) {
            panic!("{}", e);
        }
    }

    /// Async form of [`Condition::wait`].
    ///
    /// Parks no thread, so dropping the future (say, under an outer
    /// `tokio::time::timeout`) abandons the wait cleanly.
    pub async fn wait_async(&self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now().checked_add(timeout);
        loop {
            // Register before checking the flag so a notify in between is not missed
            let notified = self.inner.async_signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_completed() {
                return Ok(());
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        debug!("async condition wait timed out after {:?}", timeout);
                        return Err(HarnessError::ConditionTimeout(timeout).into());
                    }
                }
                None => notified.await,
            }
        }
    }

    pub fn reset(&self) {
        *self.lock() = false;
    }

    /// Marks the condition complete and wakes every waiter
    pub fn notify(&self) {
        let mut completed = self.lock();
        *completed = true;
        self.inner.signal.notify_all();
        self.inner.async_signal.notify_waiters();
    }

    pub fn is_completed(&self) -> bool {
        *self.lock()
    }
}
