//! Race-safe unload execution.
//!
//! An active tab cannot be discarded, so unloading one first activates a
//! replacement. Activating a tab that another interaction is discarding at
//! the same moment can hang the browser window; the progress maps keep the
//! two kinds of work off each other's tabs.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::closest::{FallbackOptions, find_closest_tab, most_recent_tab};
use super::progress::{PendingActivations, PendingUnloads, UnloadClaim};
use crate::host::{DiscardBackend, HostError, Tab, TabHost, TabId, TabQuery};

/// Grace delays of the race guard, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnloadTiming {
    /// How long a tab stays marked as unloading after its unload finished.
    pub unload_release_ms: u64,
    /// How long an activation mark lives.
    pub activation_grace_ms: u64,
    /// Targets marked for activation within this window are left alone.
    pub activation_window_ms: u64,
}

impl Default for UnloadTiming {
    fn default() -> Self {
        Self {
            unload_release_ms: 500,
            activation_grace_ms: 1_000,
            activation_window_ms: 1_000,
        }
    }
}

/// Unload policy shared by every caller, as configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnloadOptions {
    #[serde(flatten)]
    pub fallback: FallbackOptions,
    /// Re-issue the discard this long after the first one, for tabs the
    /// browser silently kept loaded. Zero or negative disables it.
    pub discard_again_after_ms: i64,
    pub use_alternate_discard_backend: bool,
}

impl UnloadOptions {
    /// Build a request for `tabs` under these options.
    pub fn request(&self, tabs: Vec<TabId>) -> UnloadRequest {
        UnloadRequest {
            tabs,
            fallback: self.fallback,
            discard_again_after: u64::try_from(self.discard_again_after_ms)
                .ok()
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            backend: if self.use_alternate_discard_backend {
                DiscardBackend::Alternate
            } else {
                DiscardBackend::Native
            },
        }
    }
}

/// One call's worth of unload work.
#[derive(Debug, Clone, PartialEq)]
pub struct UnloadRequest {
    pub tabs: Vec<TabId>,
    pub fallback: FallbackOptions,
    pub discard_again_after: Option<Duration>,
    pub backend: DiscardBackend,
}

/// Why a requested tab was not discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The tab was closed before it could be unloaded.
    Vanished,
    /// The tab is about to be activated.
    ActivationPending,
    /// Another unload of the tab is in flight.
    AlreadyUnloading,
    /// The tab was active and no other tab could take its place.
    NoReplacement,
    /// The browser refused the discard.
    DiscardFailed,
}

/// A requested tab that was left loaded, and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTab {
    pub tab: TabId,
    pub reason: SkipReason,
}

/// Outcome of [`UnloadCoordinator::unload_tabs`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnloadReport {
    pub discarded: Vec<TabId>,
    pub skipped: Vec<SkippedTab>,
}

impl UnloadReport {
    fn skip(&mut self, tab: TabId, reason: SkipReason) {
        self.skipped.push(SkippedTab { tab, reason });
    }

    /// Tabs skipped for `reason`, in request order.
    #[cfg(test)]
    pub fn skipped_for(&self, reason: SkipReason) -> Vec<TabId> {
        self.skipped
            .iter()
            .filter(|s| s.reason == reason)
            .map(|s| s.tab)
            .collect()
    }
}

/// Why an active tab could not be moved away from.
#[derive(Debug, thiserror::Error)]
pub enum UnloadError {
    #[error("no tab can replace active tab {tab}")]
    NoCandidate { tab: TabId },
    #[error("host call for tab {tab} failed: {source}")]
    Host {
        tab: TabId,
        #[source]
        source: HostError,
    },
}

impl UnloadError {
    /// The tab that stayed active.
    pub fn tab(&self) -> TabId {
        match self {
            Self::NoCandidate { tab } | Self::Host { tab, .. } => *tab,
        }
    }
}

/// Executes unloads for every caller: mouse gates, menus and commands.
pub struct UnloadCoordinator {
    host: Arc<dyn TabHost>,
    timing: RwLock<UnloadTiming>,
    pending_unloads: Arc<PendingUnloads>,
    pending_activations: Arc<PendingActivations>,
}

impl UnloadCoordinator {
    pub fn new(host: Arc<dyn TabHost>, timing: UnloadTiming) -> Self {
        Self {
            host,
            timing: RwLock::new(timing),
            pending_unloads: Arc::new(PendingUnloads::new()),
            pending_activations: Arc::new(PendingActivations::new()),
        }
    }

    /// Replace the grace delays. Calls in flight keep the old ones.
    pub fn set_timing(&self, timing: UnloadTiming) {
        *self.timing.write() = timing;
    }

    /// Unload `request.tabs`, moving focus away from any of them that is
    /// active. Host failures only skip the affected tabs.
    pub async fn unload_tabs(&self, request: UnloadRequest) -> UnloadReport {
        let timing = *self.timing.read();
        let mut report = UnloadReport::default();

        let mut requested = Vec::with_capacity(request.tabs.len());
        for id in &request.tabs {
            if !requested.contains(id) {
                requested.push(*id);
            }
        }

        // Snapshots from the caller may be stale.
        let mut targets = Vec::with_capacity(requested.len());
        for id in &requested {
            match self.host.get_tab(*id).await {
                Ok(tab) => targets.push(tab),
                Err(e) => {
                    debug!(tab = %id, error = %e, "unload target vanished");
                    report.skip(*id, SkipReason::Vanished);
                }
            }
        }

        let window = Duration::from_millis(timing.activation_window_ms);
        targets.retain(|tab| {
            let pending = self.pending_activations.noticed_within(tab.id, window);
            if pending {
                debug!(tab = %tab.id, "skipping tab about to be activated");
                report.skip(tab.id, SkipReason::ActivationPending);
            }
            !pending
        });

        // Claims stay alive until this call returns, or until a second
        // discard pass finishes.
        let release = Duration::from_millis(timing.unload_release_ms);
        let mut claims: Vec<UnloadClaim> = Vec::with_capacity(targets.len());
        targets.retain(|tab| {
            let claim = self.pending_unloads.claim(tab.id, release);
            let first = claim.is_first();
            claims.push(claim);
            if !first {
                debug!(tab = %tab.id, "unload already in progress");
                report.skip(tab.id, SkipReason::AlreadyUnloading);
            }
            first
        });

        let mut stuck = HashSet::new();
        if let Err(errors) = self
            .ensure_tabs_arent_active(&targets, &request.fallback)
            .await
        {
            for e in errors {
                warn!(tab = %e.tab(), error = %e, "not unloading active tab");
                report.skip(e.tab(), SkipReason::NoReplacement);
                stuck.insert(e.tab());
            }
        }
        let ready: Vec<TabId> = targets
            .iter()
            .map(|t| t.id)
            .filter(|id| !stuck.contains(id))
            .collect();

        if ready.is_empty() {
            return report;
        }

        if let Err(e) = self.host.discard_tabs(&ready, request.backend).await {
            warn!(tabs = ?ready, error = %e, "discard failed");
            for id in ready {
                report.skip(id, SkipReason::DiscardFailed);
            }
            return report;
        }
        info!(tabs = ?ready, "discarded tabs");

        if let Some(delay) = request.discard_again_after {
            // The claims keep the tabs out of replacement picks until the
            // second pass is over.
            let host = Arc::clone(&self.host);
            let ids = ready.clone();
            let backend = request.backend;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                discard_again(host.as_ref(), &ids, backend).await;
                drop(claims);
            });
        }

        report.discarded = ready;
        report
    }

    /// Move focus off every active tab in `tabs`. Tabs in `tabs` are never
    /// picked as replacements. Every active tab is attempted; the tabs that
    /// stayed active are returned as errors.
    pub async fn ensure_tabs_arent_active(
        &self,
        tabs: &[Tab],
        fallback: &FallbackOptions,
    ) -> Result<(), Vec<UnloadError>> {
        let doomed: HashSet<TabId> = tabs.iter().map(|t| t.id).collect();
        let mut errors = Vec::new();
        for tab in tabs.iter().filter(|t| t.active) {
            if let Err(e) = self.activate_replacement(tab, &doomed, fallback).await {
                errors.push(e);
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Activate a replacement for active `tab` in its window and return it.
    async fn activate_replacement(
        &self,
        tab: &Tab,
        doomed: &HashSet<TabId>,
        fallback: &FallbackOptions,
    ) -> Result<TabId, UnloadError> {
        let host_error = |source| UnloadError::Host {
            tab: tab.id,
            source,
        };
        let mut strip = self
            .host
            .query_tabs(TabQuery::window(tab.window_id))
            .await
            .map_err(host_error)?;
        strip.sort_by_key(|t| t.index);

        let unloading = self.pending_unloads.ids();
        let usable = |t: &Tab| {
            t.id != tab.id
                && !doomed.contains(&t.id)
                && !unloading.contains(&t.id)
                && !(fallback.ignore_hidden_tabs && t.hidden)
        };

        let replacement = if fallback.fallback_to_last_selected {
            most_recent_tab(&strip, usable)
        } else {
            let active = strip
                .iter()
                .position(|t| t.id == tab.id)
                .ok_or(UnloadError::Host {
                    tab: tab.id,
                    source: HostError::NoSuchTab(tab.id),
                })?;
            find_closest_tab(&strip, active, fallback, |t| usable(t) && !t.discarded)
                .or_else(|| find_closest_tab(&strip, active, fallback, usable))
        };
        let replacement = replacement
            .map(|t| t.id)
            .ok_or(UnloadError::NoCandidate { tab: tab.id })?;

        let grace = Duration::from_millis(self.timing.read().activation_grace_ms);
        self.pending_activations.mark(replacement, grace);
        self.host
            .set_active_tab(replacement)
            .await
            .map_err(host_error)?;
        debug!(from = %tab.id, to = %replacement, "activated replacement tab");
        Ok(replacement)
    }
}

/// Discard again the tabs in `ids` the browser left loaded. Active tabs are
/// left alone.
async fn discard_again(host: &dyn TabHost, ids: &[TabId], backend: DiscardBackend) {
    let mut stubborn = Vec::new();
    for id in ids {
        if let Ok(tab) = host.get_tab(*id).await
            && !tab.discarded
            && !tab.active
        {
            stubborn.push(tab.id);
        }
    }
    if stubborn.is_empty() {
        return;
    }
    debug!(tabs = ?stubborn, "re-issuing discard");
    if let Err(e) = host.discard_tabs(&stubborn, backend).await {
        warn!(tabs = ?stubborn, error = %e, "repeated discard failed");
    }
}
