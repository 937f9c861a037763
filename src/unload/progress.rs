//! In-memory progress maps guarding the activate/discard race.
//!
//! [`PendingUnloads`] counts unload attempts per tab; a tab with a positive
//! count is never picked as the replacement to activate.
//! [`PendingActivations`] remembers tabs we are about to activate; such a
//! tab is kept out of unload target lists, since activating and discarding
//! the same tab at once can freeze the browser window.
//!
//! Both maps release their marks after a grace delay rather than
//! immediately, to outlast lagging tab state in the browser.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::host::TabId;

/// Per-tab count of unload attempts in progress.
#[derive(Debug, Default)]
pub struct PendingUnloads {
    counts: Mutex<HashMap<TabId, usize>>,
}

impl PendingUnloads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as being unloaded. The mark is held until the returned
    /// claim is dropped, plus `grace`.
    pub fn claim(self: &Arc<Self>, id: TabId, grace: Duration) -> UnloadClaim {
        let mut counts = self.counts.lock();
        let count = counts.entry(id).or_insert(0);
        *count += 1;
        UnloadClaim {
            map: Arc::clone(self),
            id,
            grace,
            first: *count == 1,
        }
    }

    #[cfg(test)]
    pub fn count(&self, id: TabId) -> usize {
        self.counts.lock().get(&id).copied().unwrap_or(0)
    }

    #[cfg(test)]
    pub fn contains(&self, id: TabId) -> bool {
        self.count(id) > 0
    }

    /// Every tab with an unload in progress.
    pub fn ids(&self) -> HashSet<TabId> {
        self.counts.lock().keys().copied().collect()
    }

    fn decrement(&self, id: TabId) {
        let mut counts = self.counts.lock();
        if let Some(count) = counts.get_mut(&id) {
            *count -= 1;
            if *count == 0 {
                counts.remove(&id);
            }
        }
    }
}

/// One unload attempt's hold on a tab. Dropping it releases the hold after
/// the grace delay, on every exit path of the attempt.
#[derive(Debug)]
pub struct UnloadClaim {
    map: Arc<PendingUnloads>,
    id: TabId,
    grace: Duration,
    first: bool,
}

impl UnloadClaim {
    /// `false` if another attempt already held the tab when this claim was
    /// taken.
    pub fn is_first(&self) -> bool {
        self.first
    }
}

impl Drop for UnloadClaim {
    fn drop(&mut self) {
        let map = Arc::clone(&self.map);
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) if !self.grace.is_zero() => {
                let grace = self.grace;
                handle.spawn(async move {
                    tokio::time::sleep(grace).await;
                    map.decrement(id);
                });
            }
            _ => map.decrement(id),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ActivationMark {
    at: Instant,
    generation: u64,
}

/// Tabs about to be activated, with the time the activation was intended.
#[derive(Debug, Default)]
pub struct PendingActivations {
    marks: Mutex<HashMap<TabId, ActivationMark>>,
    generation: Mutex<u64>,
}

impl PendingActivations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an intended activation of `id`. The mark expires after
    /// `grace`; re-marking restarts the grace window.
    pub fn mark(self: &Arc<Self>, id: TabId, grace: Duration) {
        let generation = {
            let mut g = self.generation.lock();
            *g += 1;
            *g
        };
        self.marks.lock().insert(
            id,
            ActivationMark {
                at: Instant::now(),
                generation,
            },
        );

        let marks = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let mut map = marks.marks.lock();
            if map.get(&id).is_some_and(|m| m.generation == generation) {
                map.remove(&id);
            }
        });
    }

    /// Whether `id` was marked no longer than `window` ago.
    pub fn noticed_within(&self, id: TabId, window: Duration) -> bool {
        let now = Instant::now();
        self.marks
            .lock()
            .get(&id)
            .is_some_and(|mark| now.saturating_duration_since(mark.at) <= window)
    }

    #[cfg(test)]
    pub fn contains(&self, id: TabId) -> bool {
        self.marks.lock().contains_key(&id)
    }
}
