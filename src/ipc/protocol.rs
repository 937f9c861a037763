//! Native messaging message types.
//!
//! Every message is a JSON object tagged by its `type` field. Inbound
//! messages come from the browser extension; outbound ones go to it.

use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::gesture::MouseMessage;
use crate::host::{DiscardBackend, TabId, TabQuery};
use crate::unload::UnloadReport;

/// Largest message accepted from the browser (16 MiB).
pub const MAX_INBOUND_SIZE: usize = 16 * 1024 * 1024;

/// Largest message the browser accepts from a native host (1 MiB).
pub const MAX_OUTBOUND_SIZE: usize = 1024 * 1024;

/// Which tab mouse notification an `event` carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "tab-mousedown")]
    MouseDown,
    #[serde(rename = "tab-mouseup")]
    MouseUp,
    #[serde(rename = "tab-dragstart")]
    DragStart,
}

/// Messages from the extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// A mouse notification; answered with a [`Outbound::Reply`].
    Event {
        id: u32,
        kind: EventKind,
        message: MouseMessage,
        /// Unix epoch milliseconds.
        time: u64,
    },

    /// Completion of an [`Outbound::Call`].
    Response {
        id: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    Settings { settings: Settings },

    /// Unload request from a menu or keyboard command.
    Unload { id: u32, tabs: Vec<TabId> },
}

/// Messages to the extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// Whether the browser should skip its default click handling.
    Reply { id: u32, suppress: bool },

    /// A tab API call the extension performs on our behalf.
    Call {
        id: u32,
        #[serde(flatten)]
        call: HostCall,
    },

    UnloadDone {
        id: u32,
        #[serde(flatten)]
        report: UnloadReport,
    },
}

/// Tab API methods, tagged by `method`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum HostCall {
    GetTab { tab: TabId },
    QueryTabs { query: TabQuery },
    SetActiveTab { tab: TabId },
    DiscardTabs {
        tabs: Vec<TabId>,
        backend: DiscardBackend,
    },
    TreeDescendants { tab: TabId },
}

/// Minimal envelope for messages of unknown `type`, so requests can still
/// be answered.
#[derive(Debug, Deserialize)]
pub struct RawEnvelope {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub id: Option<u32>,
}
