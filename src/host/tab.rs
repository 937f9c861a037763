//! Tab snapshots and queries exchanged with the browser.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Browser tab identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Browser window identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A point-in-time view of a tab. Snapshots go stale as soon as they are
/// taken; anything that acts on a tab re-fetches it first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    pub window_id: WindowId,
    /// Zero-based position in the window's tab strip.
    pub index: usize,
    #[serde(default)]
    pub active: bool,
    /// Unloaded from memory.
    #[serde(default)]
    pub discarded: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub pinned: bool,
    /// Unix epoch milliseconds of the last time the tab was focused.
    #[serde(default)]
    pub last_accessed: u64,
}

/// Filter for [`super::TabHost::query_tabs`]. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<WindowId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discarded: Option<bool>,
}

impl TabQuery {
    /// Every tab in one window.
    pub fn window(window_id: WindowId) -> Self {
        Self {
            window_id: Some(window_id),
            ..Self::default()
        }
    }

    #[cfg(test)]
    pub fn matches(&self, tab: &Tab) -> bool {
        self.window_id.is_none_or(|w| w == tab.window_id)
            && self.hidden.is_none_or(|h| h == tab.hidden)
            && self.discarded.is_none_or(|d| d == tab.discarded)
    }
}

/// Which browser facility performs the discard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardBackend {
    /// The browser's own tab discard call.
    #[default]
    Native,
    /// The tree sidebar's unload facility, for tabs the browser refuses.
    Alternate,
}
