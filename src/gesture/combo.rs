//! Mouse combo configuration and matching.
//!
//! A combo is a mouse button plus modifier rule plus the timing rules that
//! decide whether a press on a tab unloads it. Field names double as the
//! TOML config keys and the JSON keys of the `settings` message.

use serde::{Deserialize, Serialize};

use crate::host::Tab;

/// The primary (left) mouse button. Drag rules only apply to it.
pub const PRIMARY_BUTTON: u8 = 0;

/// Modifier key state, as pressed or as configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    /// Whether no modifier is set.
    pub fn none(&self) -> bool {
        !(self.ctrl || self.shift || self.alt || self.meta)
    }
}

/// How pressed modifiers are compared with a combo's.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierMode {
    /// Pressed modifiers must equal the configured ones.
    #[default]
    Exact,
    /// At least one configured modifier must be pressed. With none
    /// configured, every press matches.
    AnyOf,
}

/// Modifier keys a combo asks for, and how to compare them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModifierRule {
    pub mode: ModifierMode,
    #[serde(flatten)]
    pub keys: Modifiers,
}

impl ModifierRule {
    /// Whether `pressed` satisfies the rule.
    pub fn matches(&self, pressed: &Modifiers) -> bool {
        match self.mode {
            ModifierMode::Exact => self.keys == *pressed,
            ModifierMode::AnyOf => {
                let k = &self.keys;
                k.none()
                    || (k.ctrl && pressed.ctrl)
                    || (k.shift && pressed.shift)
                    || (k.alt && pressed.alt)
                    || (k.meta && pressed.meta)
            }
        }
    }
}

/// Double-click rule settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoubleClickConfig {
    pub enabled: bool,
    /// `true`: only a double click unloads. `false`: a double click
    /// cancels the unload.
    pub only_double_click_counts: bool,
    pub timeout_ms: i64,
}

impl Default for DoubleClickConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            only_double_click_counts: false,
            timeout_ms: 500,
        }
    }
}

/// Drag rule settings. Only used for the primary button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DragConfig {
    pub enabled: bool,
    /// `true`: dragging cancels the unload. `false`: a drag is required.
    pub cancels_unload: bool,
    /// Treat releasing the button before the timeout as a drag.
    pub mouse_up_counts_as_drag: bool,
    pub timeout_ms: i64,
}

impl Default for DragConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cancels_unload: true,
            mouse_up_counts_as_drag: false,
            timeout_ms: 500,
        }
    }
}

/// Unload the pressed tab's subtree in the tree sidebar instead of the tab.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub enabled: bool,
    /// Leave the pressed (root) tab loaded.
    pub exclude_root: bool,
    /// Leave the active tab loaded if it is part of the subtree.
    pub exclude_active: bool,
}

/// One configured mouse combo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComboConfig {
    pub button: u8,
    pub modifiers: ModifierRule,
    /// Minimum press duration. `<= 0` disables the bound.
    pub min_timeout_ms: i64,
    /// Maximum press duration. `<= 0` disables the bound.
    pub max_timeout_ms: i64,
    pub double_click: DoubleClickConfig,
    pub drag: DragConfig,
    pub apply_to_all_tabs: bool,
    /// Act on unloaded tabs only, instead of loaded tabs only.
    pub apply_to_unloaded_tabs_instead: bool,
    /// Never ask the browser to skip its own handling of the click.
    pub dont_prevent_default_action: bool,
    pub tree: TreeConfig,
}

impl Default for ComboConfig {
    fn default() -> Self {
        Self {
            button: PRIMARY_BUTTON,
            modifiers: ModifierRule::default(),
            min_timeout_ms: 0,
            max_timeout_ms: 500,
            double_click: DoubleClickConfig::default(),
            drag: DragConfig {
                enabled: true,
                ..DragConfig::default()
            },
            apply_to_all_tabs: false,
            apply_to_unloaded_tabs_instead: false,
            dont_prevent_default_action: false,
            tree: TreeConfig::default(),
        }
    }
}

impl ComboConfig {
    /// Whether a press with `button` and `pressed` modifiers is this combo.
    pub fn matches_press(&self, button: u8, pressed: &Modifiers) -> bool {
        button == self.button && self.modifiers.matches(pressed)
    }

    /// Whether the tab's loaded state is one this combo acts on.
    ///
    /// Tree mode is not consulted here; callers skip the filter entirely
    /// when tree mode is enabled.
    pub fn accepts_tab(&self, tab: &Tab) -> bool {
        if self.apply_to_all_tabs {
            true
        } else if self.apply_to_unloaded_tabs_instead {
            tab.discarded
        } else {
            !tab.discarded
        }
    }

    /// Whether the drag rule takes part in decisions for this combo.
    pub fn uses_drag(&self) -> bool {
        self.drag.enabled && self.button == PRIMARY_BUTTON
    }
}
