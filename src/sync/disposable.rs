//! Resource groups released together, exactly once.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// A resource that can be torn down by a [`DisposableGroup`].
///
/// Implementors override whichever hooks apply and return `true` from the
/// hook that handled the teardown. The group tries `dispose`, then `stop`,
/// then `cancel`, and stops at the first hook that returns `true`.
pub trait Release: Send + Sync {
    fn dispose(&self) -> bool {
        false
    }

    fn stop(&self) -> bool {
        false
    }

    fn cancel(&self) -> bool {
        false
    }
}

impl Release for tokio::task::AbortHandle {
    fn cancel(&self) -> bool {
        self.abort();
        true
    }
}

/// Tear down a single resource using the fixed hook order.
///
/// Returns `false` if no hook handled the resource.
pub fn release(resource: &dyn Release) -> bool {
    resource.dispose() || resource.stop() || resource.cancel()
}

/// A set of resources released together.
///
/// [`DisposableGroup::dispose`] releases every tracked resource once.
/// Resources tracked after disposal are released immediately.
#[derive(Clone)]
pub struct DisposableGroup {
    /// `None` once the group has been disposed.
    tracked: Arc<Mutex<Option<Vec<Arc<dyn Release>>>>>,
}

impl fmt::Debug for DisposableGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tracked = self.tracked.lock();
        f.debug_struct("DisposableGroup")
            .field("disposed", &tracked.is_none())
            .field("tracked", &tracked.as_ref().map_or(0, Vec::len))
            .finish()
    }
}

impl Default for DisposableGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl DisposableGroup {
    pub fn new() -> Self {
        Self {
            tracked: Arc::new(Mutex::new(Some(Vec::new()))),
        }
    }

    /// Track a resource. If the group is already disposed the resource is
    /// released before this returns.
    pub fn track(&self, resource: Arc<dyn Release>) {
        {
            let mut tracked = self.tracked.lock();
            if let Some(list) = tracked.as_mut() {
                list.push(resource);
                return;
            }
        }
        if !release(resource.as_ref()) {
            tracing::debug!("tracked resource has no teardown hook");
        }
    }

    #[cfg(test)]
    pub fn is_disposed(&self) -> bool {
        self.tracked.lock().is_none()
    }

    /// Release every tracked resource. Later calls are no-ops.
    pub fn dispose(&self) {
        let Some(resources) = self.tracked.lock().take() else {
            return;
        };
        for resource in resources {
            if !release(resource.as_ref()) {
                tracing::debug!("tracked resource has no teardown hook");
            }
        }
    }
}

impl Release for DisposableGroup {
    fn dispose(&self) -> bool {
        DisposableGroup::dispose(self);
        true
    }
}
