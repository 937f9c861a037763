//! One-shot cancelable task: a verdict slot plus the resources producing it.

use std::fmt;
use std::sync::Arc;

use super::disposable::{DisposableGroup, Release};
use super::single::{Rejection, SingleAssignment, Settled};

/// A value that is settled once, together with the timers and listeners
/// that work towards settling it.
///
/// Settling the operation releases every tracked resource, so no timer
/// callback or listener owned by the operation runs after the outcome is
/// visible. Late settle attempts are ignored.
pub struct Operation<T> {
    value: SingleAssignment<T>,
    resources: DisposableGroup,
}

impl<T> Clone for Operation<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            resources: self.resources.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("value", &self.value)
            .field("resources", &self.resources)
            .finish()
    }
}

impl<T> Default for Operation<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Operation<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            value: SingleAssignment::new(),
            resources: DisposableGroup::new(),
        }
    }

    /// Settle with `value`, then release owned resources. Returns `true` if
    /// this call settled the operation.
    pub fn resolve(&self, value: T) -> bool {
        let won = self.value.resolve(value);
        self.resources.dispose();
        won
    }

    /// Settle without a value, then release owned resources.
    pub fn reject(&self, reason: Rejection) -> bool {
        let won = self.value.reject(reason);
        self.resources.dispose();
        won
    }

    /// Cancel the operation: it settles as [`Rejection::Canceled`] unless it
    /// already settled, and its resources are released.
    pub fn dispose(&self) {
        self.reject(Rejection::Canceled);
    }

    /// Whether the operation has settled.
    pub fn done(&self) -> bool {
        self.value.is_set()
    }

    /// Attach a resource released when the operation settles.
    pub fn track(&self, resource: Arc<dyn Release>) {
        self.resources.track(resource);
    }

    /// The verdict, or `None` while pending.
    pub fn outcome(&self) -> Option<Settled<T>> {
        self.value.get()
    }

    /// Run `callback` once the operation settles, or now if it already has.
    pub fn on_settle<F>(&self, callback: F)
    where
        F: FnOnce(&Settled<T>) + Send + 'static,
    {
        self.value.on_settle(callback);
    }

    /// Future resolving to the verdict. Does not borrow the operation.
    pub fn wait(&self) -> impl Future<Output = Settled<T>> + Send + 'static {
        self.value.wait()
    }
}

impl<T> Release for Operation<T>
where
    T: Clone + Send + 'static,
{
    fn dispose(&self) -> bool {
        Operation::dispose(self);
        true
    }
}
