//! Single-assignment value slot.
//!
//! A [`SingleAssignment`] is resolved or rejected at most once. The first
//! settle call wins; later calls return `false` and change nothing. Readers
//! either poll [`SingleAssignment::get`], register a synchronous
//! [`SingleAssignment::on_settle`] callback, or `.await`
//! [`SingleAssignment::wait`].

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Why a slot settled without a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// The owner canceled the work before it produced a value.
    #[error("canceled")]
    Canceled,
    /// Every handle that could settle the slot was dropped.
    #[error("abandoned before settling")]
    Abandoned,
}

/// Outcome stored in a settled slot.
pub type Settled<T> = Result<T, Rejection>;

type Callback<T> = Box<dyn FnOnce(&Settled<T>) + Send>;

struct Slot<T> {
    outcome: Option<Settled<T>>,
    callbacks: Vec<Callback<T>>,
}

/// Shared handle to a value that is assigned exactly once.
///
/// Cloning is cheap; all clones observe the same slot.
pub struct SingleAssignment<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Clone for SingleAssignment<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for SingleAssignment<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for SingleAssignment<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.lock();
        f.debug_struct("SingleAssignment")
            .field("outcome", &slot.outcome)
            .field("callbacks", &slot.callbacks.len())
            .finish()
    }
}

impl<T> SingleAssignment<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                outcome: None,
                callbacks: Vec::new(),
            })),
        }
    }

    /// Assign a value. Returns `true` if this call settled the slot.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settle without a value. Returns `true` if this call settled the slot.
    pub fn reject(&self, reason: Rejection) -> bool {
        self.settle(Err(reason))
    }

    /// Whether the slot has settled.
    pub fn is_set(&self) -> bool {
        self.slot.lock().outcome.is_some()
    }

    /// The settled outcome, or `None` while pending.
    pub fn get(&self) -> Option<Settled<T>> {
        self.slot.lock().outcome.clone()
    }

    /// Run `callback` once the slot settles.
    ///
    /// If the slot has already settled the callback runs immediately on
    /// the calling task; otherwise it runs synchronously inside the call
    /// that settles the slot.
    pub fn on_settle<F>(&self, callback: F)
    where
        F: FnOnce(&Settled<T>) + Send + 'static,
    {
        let mut slot = self.slot.lock();
        match slot.outcome.clone() {
            Some(outcome) => {
                drop(slot);
                callback(&outcome);
            }
            None => slot.callbacks.push(Box::new(callback)),
        }
    }

    /// Wait until the slot settles.
    ///
    /// The waiter is registered when this is called, not when the returned
    /// future is first polled. The future does not keep the slot alive: it
    /// yields [`Rejection::Abandoned`] if every handle is dropped while the
    /// slot is still pending.
    pub fn wait(&self) -> impl Future<Output = Settled<T>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        self.on_settle(move |outcome| {
            let _ = tx.send(outcome.clone());
        });
        async move { rx.await.unwrap_or(Err(Rejection::Abandoned)) }
    }

    fn settle(&self, outcome: Settled<T>) -> bool {
        let callbacks = {
            let mut slot = self.slot.lock();
            if slot.outcome.is_some() {
                return false;
            }
            slot.outcome = Some(outcome.clone());
            std::mem::take(&mut slot.callbacks)
        };
        for callback in callbacks {
            callback(&outcome);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn first_resolution_wins() {
        let slot = SingleAssignment::new();
        assert!(slot.resolve(1));
        assert!(!slot.resolve(2));
        assert!(!slot.reject(Rejection::Canceled));
        assert_eq!(slot.get(), Some(Ok(1)));
    }

    #[test]
    fn rejection_blocks_later_resolve() {
        let slot = SingleAssignment::<bool>::new();
        assert!(slot.reject(Rejection::Canceled));
        assert!(!slot.resolve(true));
        assert_eq!(slot.get(), Some(Err(Rejection::Canceled)));
    }

    #[test]
    fn pending_slot_reports_unset() {
        let slot = SingleAssignment::<u8>::new();
        assert!(!slot.is_set());
        assert_eq!(slot.get(), None);
    }

    #[test]
    fn callbacks_run_once_at_settle_time() {
        let slot = SingleAssignment::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        slot.on_settle(move |outcome| {
            assert_eq!(outcome, &Ok("done"));
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        slot.resolve("done");
        slot.resolve("again");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_callback_runs_immediately() {
        let slot = SingleAssignment::new();
        slot.resolve(7);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        slot.on_settle(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_may_settle_another_slot_from_inside() {
        let first = SingleAssignment::new();
        let second = SingleAssignment::new();
        let chained = second.clone();
        first.on_settle(move |outcome| {
            chained.resolve(outcome.clone().map(|v: i32| v * 2).unwrap_or(0));
        });
        // Re-entering the same slot from its own callback must not deadlock.
        let reentrant = first.clone();
        first.on_settle(move |_| {
            assert!(!reentrant.resolve(99));
        });
        first.resolve(21);
        assert_eq!(second.get(), Some(Ok(42)));
    }

    #[tokio::test]
    async fn wait_suspends_until_resolved() {
        let slot = SingleAssignment::new();
        let writer = slot.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            writer.resolve(5u32);
        });
        assert_eq!(slot.wait().await, Ok(5));
        // Reads after settling return immediately.
        assert_eq!(slot.wait().await, Ok(5));
    }

    #[tokio::test]
    async fn wait_reports_abandoned_slot() {
        let slot = SingleAssignment::<u32>::new();
        let pending = slot.wait();
        drop(slot);
        assert_eq!(pending.await, Err(Rejection::Abandoned));
    }
}
