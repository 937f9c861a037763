//! Click-intent resolution: deciding whether a mouse press unloads a tab.
//!
//! Each configured combo gets a [`gate::ButtonGate`]. On a matching press
//! the gate spawns a set of monitors, each an [`Operation`] voting on the
//! unload, and aggregates them in a [`collection::MonitorCollection`]. A
//! `true` verdict hands the tab (or its subtree) to the unload
//! coordinator.
//!
//! [`Operation`]: crate::sync::Operation

pub mod collection;
pub mod combo;
pub mod gate;
pub mod monitor;

use serde::{Deserialize, Serialize};

use crate::host::Tab;
use crate::sync::EventSource;

pub use combo::{ComboConfig, Modifiers};
pub use gate::{GateContext, GateSet, Suppress};

/// What the input relay reports about a press, release or drag on a tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MouseMessage {
    pub button: u8,
    #[serde(flatten)]
    pub modifiers: Modifiers,
    pub tab: Tab,
}

/// A mouse notification with the time it happened (epoch milliseconds).
#[derive(Debug, Clone, PartialEq)]
pub struct MouseEvent {
    pub message: MouseMessage,
    pub time: u64,
}

/// Event sources a gate feeds and its monitors listen to. Only events for
/// the gate's own combo are dispatched here.
#[derive(Debug, Clone)]
pub struct GateSignals {
    pub downs: EventSource<MouseEvent>,
    pub ups: EventSource<MouseEvent>,
    pub drags: EventSource<MouseEvent>,
}

impl GateSignals {
    pub fn new() -> Self {
        Self {
            downs: EventSource::new("mousedown"),
            ups: EventSource::new("mouseup"),
            drags: EventSource::new("dragstart"),
        }
    }
}

impl Default for GateSignals {
    fn default() -> Self {
        Self::new()
    }
}
