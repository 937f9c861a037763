//! Listener fan-out with per-listener failure isolation.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::disposable::Release;

/// Error returned by a listener. Logged by the dispatcher; never stops
/// delivery to the remaining listeners.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ListenerError(pub String);

type Listener<T> = Arc<dyn Fn(&T) -> Result<(), ListenerError> + Send + Sync>;

struct Registry<T> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener<T>)>>,
}

/// A synchronous event source.
///
/// [`EventSource::dispatch`] invokes every listener registered at the time
/// of the call, in registration order. Listeners may subscribe, unsubscribe
/// or dispatch re-entrantly; the listener list is snapshotted before any
/// listener runs.
pub struct EventSource<T> {
    registry: Arc<Registry<T>>,
    name: &'static str,
}

impl<T> Clone for EventSource<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            name: self.name,
        }
    }
}

impl<T: 'static> fmt::Debug for EventSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("name", &self.name)
            .field("listeners", &self.len())
            .finish()
    }
}

impl<T: 'static> EventSource<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(1),
                listeners: Mutex::new(Vec::new()),
            }),
            name,
        }
    }

    /// Register a listener. It stays registered until the returned
    /// [`Subscription`] is disposed.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .listeners
            .lock()
            .push((id, Arc::new(listener)));

        let registry: Weak<Registry<T>> = Arc::downgrade(&self.registry);
        Subscription {
            remove: Mutex::new(Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry.listeners.lock().retain(|(lid, _)| *lid != id);
                }
            }))),
        }
    }

    /// Deliver `event` to every listener. Returns the number of listeners
    /// that failed, by error or by panic.
    pub fn dispatch(&self, event: &T) -> usize {
        let snapshot: Vec<Listener<T>> = self
            .registry
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        let mut failures = 0;
        for listener in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    tracing::warn!(source = self.name, error = %e, "event listener failed");
                }
                Err(payload) => {
                    failures += 1;
                    tracing::error!(
                        source = self.name,
                        panic = panic_message(payload.as_ref()),
                        "event listener panicked"
                    );
                }
            }
        }
        failures
    }

    pub fn len(&self) -> usize {
        self.registry.listeners.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Handle that removes a listener from its [`EventSource`] when disposed.
pub struct Subscription {
    remove: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    /// Remove the listener. Idempotent.
    pub fn unsubscribe(&self) {
        let remove = self.remove.lock().take();
        if let Some(remove) = remove {
            remove();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.lock().is_some())
            .finish()
    }
}

impl Release for Subscription {
    fn dispose(&self) -> bool {
        self.unsubscribe();
        true
    }
}
