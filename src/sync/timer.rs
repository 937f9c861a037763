//! Cancelable delayed callbacks.

use std::time::Duration;

use tokio::task::AbortHandle;

use super::disposable::Release;
use super::single::SingleAssignment;

/// How a [`CancelableTimer`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    Fired,
    Canceled,
}

/// A callback scheduled on the tokio runtime after a delay.
///
/// Fire and cancel race through a single-assignment slot: the callback
/// runs only if the slot settled to [`TimerOutcome::Fired`], so a timer
/// canceled before firing never runs its callback.
#[derive(Debug)]
pub struct CancelableTimer {
    outcome: SingleAssignment<TimerOutcome>,
    task: AbortHandle,
}

impl CancelableTimer {
    /// Schedule `callback` after `delay`. Must be called within a tokio
    /// runtime. A zero delay fires on the next runtime turn.
    pub fn start<F>(delay: Duration, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let outcome = SingleAssignment::new();
        let slot = outcome.clone();
        // Deadline is fixed now, not when the task is first polled.
        let deadline = tokio::time::Instant::now() + delay;
        let task = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep_until(deadline).await;
            }
            if slot.resolve(TimerOutcome::Fired) {
                callback();
            }
        });
        Self {
            outcome,
            task: task.abort_handle(),
        }
    }

    /// Cancel the timer. Returns `true` if it had not fired yet.
    pub fn cancel(&self) -> bool {
        if self.outcome.resolve(TimerOutcome::Canceled) {
            self.task.abort();
            true
        } else {
            false
        }
    }

    /// Settles when the timer fires or is canceled.
    #[cfg(test)]
    pub fn outcome(&self) -> &SingleAssignment<TimerOutcome> {
        &self.outcome
    }
}

impl Release for CancelableTimer {
    fn cancel(&self) -> bool {
        CancelableTimer::cancel(self);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn flag() -> (Arc<AtomicBool>, impl FnOnce() + Send + 'static) {
        let flag = Arc::new(AtomicBool::new(false));
        let set = Arc::clone(&flag);
        (flag, move || set.store(true, Ordering::SeqCst))
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let (fired, callback) = flag();
        let timer = CancelableTimer::start(Duration::from_millis(100), callback);

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert!(!fired.load(Ordering::SeqCst));

        assert_eq!(timer.outcome().wait().await, Ok(TimerOutcome::Fired));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_callback() {
        let (fired, callback) = flag();
        let timer = CancelableTimer::start(Duration::from_millis(100), callback);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(timer.cancel());
        assert_eq!(timer.outcome().get(), Some(Ok(TimerOutcome::Canceled)));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_fire_is_noop() {
        let (fired, callback) = flag();
        let timer = CancelableTimer::start(Duration::from_millis(10), callback);
        timer.outcome().wait().await.unwrap();
        assert!(!timer.cancel());
        assert!(fired.load(Ordering::SeqCst));
        assert_eq!(timer.outcome().get(), Some(Ok(TimerOutcome::Fired)));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_fires_soon() {
        let (fired, callback) = flag();
        let timer = CancelableTimer::start(Duration::ZERO, callback);
        assert!(!fired.load(Ordering::SeqCst));
        assert_eq!(timer.outcome().wait().await, Ok(TimerOutcome::Fired));
        assert!(fired.load(Ordering::SeqCst));
    }
}
