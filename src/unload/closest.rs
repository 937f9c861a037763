//! Choosing which tab to activate in place of one about to be unloaded.

use serde::{Deserialize, Serialize};

use crate::host::Tab;

/// Replacement-tab policy for unloading an active tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackOptions {
    /// Activate the most recently focused tab instead of a neighbor.
    pub fallback_to_last_selected: bool,
    /// Never pick a hidden tab.
    pub ignore_hidden_tabs: bool,
    /// Continue the neighbor scan past the ends of the tab strip.
    pub wrap_around: bool,
    pub check_before_active: bool,
    pub check_after_active: bool,
}

impl Default for FallbackOptions {
    fn default() -> Self {
        Self {
            fallback_to_last_selected: false,
            ignore_hidden_tabs: true,
            wrap_around: true,
            check_before_active: true,
            check_after_active: true,
        }
    }
}

/// Scan outward from `tabs[active]` for the nearest tab `accept` allows.
///
/// `tabs` is one window's tab strip in index order. At equal distance the
/// tab after the active one wins over the tab before it. With neither
/// direction enabled both are scanned.
pub fn find_closest_tab<'a, F>(
    tabs: &'a [Tab],
    active: usize,
    options: &FallbackOptions,
    accept: F,
) -> Option<&'a Tab>
where
    F: Fn(&Tab) -> bool,
{
    let count = tabs.len();
    if active >= count {
        return None;
    }
    let (before, after) = match (options.check_before_active, options.check_after_active) {
        (false, false) => (true, true),
        directions => directions,
    };

    for distance in 1..count {
        if after {
            let next = if active + distance < count {
                Some(active + distance)
            } else if options.wrap_around {
                Some((active + distance) % count)
            } else {
                None
            };
            if let Some(tab) = next.map(|i| &tabs[i]).filter(|t| accept(t)) {
                return Some(tab);
            }
        }
        if before {
            let previous = if distance <= active {
                Some(active - distance)
            } else if options.wrap_around {
                Some(active + count - distance)
            } else {
                None
            };
            if let Some(tab) = previous.map(|i| &tabs[i]).filter(|t| accept(t)) {
                return Some(tab);
            }
        }
    }
    None
}

/// The most recently focused tab `accept` allows, preferring loaded tabs
/// over discarded ones.
pub fn most_recent_tab<'a, F>(tabs: &'a [Tab], accept: F) -> Option<&'a Tab>
where
    F: Fn(&Tab) -> bool,
{
    let latest = |discarded: bool| {
        tabs.iter()
            .filter(|t| t.discarded == discarded && accept(t))
            .max_by_key(|t| t.last_accessed)
    };
    latest(false).or_else(|| latest(true))
}
