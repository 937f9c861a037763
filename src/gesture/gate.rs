//! Per-combo gates and the set of gates fed by the daemon.

use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, join_all};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use super::collection::MonitorCollection;
use super::combo::{ComboConfig, TreeConfig};
use super::monitor::{DoubleClickMonitor, DragMonitor, DurationMonitor};
use super::{GateSignals, MouseEvent};
use crate::host::{HostError, Tab, TabHost, TabId};
use crate::sync::Operation;
use crate::unload::{UnloadCoordinator, UnloadOptions};

/// Whether the browser should skip its default handling of a press.
pub enum Suppress {
    Decided(bool),
    /// Known once the interaction's verdict is.
    Pending(BoxFuture<'static, bool>),
}

impl Suppress {
    fn from_verdict(verdict: &Operation<bool>) -> Self {
        match verdict.outcome() {
            Some(outcome) => Self::Decided(outcome.unwrap_or(false)),
            None => Self::Pending(verdict.wait().map(|o| o.unwrap_or(false)).boxed()),
        }
    }

    /// Combine the decisions of several gates: any `true` suppresses.
    pub fn any(decisions: Vec<Suppress>) -> Self {
        let mut pending = Vec::new();
        for decision in decisions {
            match decision {
                Self::Decided(true) => return Self::Decided(true),
                Self::Decided(false) => {}
                Self::Pending(f) => pending.push(f),
            }
        }
        if pending.is_empty() {
            return Self::Decided(false);
        }
        Self::Pending(
            join_all(pending)
                .map(|all| all.into_iter().any(|s| s))
                .boxed(),
        )
    }

    /// Wait for the decision.
    pub async fn resolve(self) -> bool {
        match self {
            Self::Decided(s) => s,
            Self::Pending(f) => f.await,
        }
    }
}

impl fmt::Debug for Suppress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decided(s) => f.debug_tuple("Decided").field(s).finish(),
            Self::Pending(_) => f.write_str("Pending"),
        }
    }
}

/// What gates need to carry out an unload.
#[derive(Clone)]
pub struct GateContext {
    pub host: Arc<dyn TabHost>,
    pub coordinator: Arc<UnloadCoordinator>,
    pub unload: Arc<RwLock<UnloadOptions>>,
}

/// The interaction most recently started on a gate.
#[derive(Debug, Clone)]
struct Interaction {
    double_click: Operation<bool>,
    verdict: Operation<bool>,
}

/// Decides unloads for one combo.
pub struct ButtonGate {
    combo: RwLock<ComboConfig>,
    signals: GateSignals,
    ctx: GateContext,
    last: Mutex<Option<Interaction>>,
}

impl ButtonGate {
    pub fn new(combo: ComboConfig, ctx: GateContext) -> Self {
        Self {
            combo: RwLock::new(combo),
            signals: GateSignals::new(),
            ctx,
            last: Mutex::new(None),
        }
    }

    /// Snapshot of the current combo.
    pub fn combo(&self) -> ComboConfig {
        self.combo.read().clone()
    }

    /// Replace the combo. Interactions already running keep the values
    /// they read at press time.
    pub fn set_combo(&self, combo: ComboConfig) {
        *self.combo.write() = combo;
    }

    #[cfg(test)]
    pub fn signals(&self) -> &GateSignals {
        &self.signals
    }

    /// Handle a press on a tab. Starts an interaction when the press matches
    /// the combo and the tab passes the filter.
    pub fn on_mouse_down(&self, event: &MouseEvent) -> Suppress {
        let combo = self.combo();
        let message = &event.message;
        if !combo.matches_press(message.button, &message.modifiers) {
            return Suppress::Decided(false);
        }

        // A press while the previous interaction still waits for its
        // second click belongs to that interaction.
        let previous = self.last.lock().clone();
        let continuation = previous.as_ref().is_some_and(|p| !p.double_click.done());

        // Monitors of this press must not see this press.
        self.signals.downs.dispatch(event);

        if let Some(previous) = previous {
            if continuation {
                debug!(tab = %message.tab.id, "double click continuation");
                return suppression(&combo, &previous.verdict);
            }
            previous.verdict.dispose();
        }

        if !combo.tree.enabled && !combo.accepts_tab(&message.tab) {
            return Suppress::Decided(false);
        }

        let double_click = DoubleClickMonitor::spawn(&combo.double_click, &self.signals);
        let mut members = vec![
            DurationMonitor::spawn(combo.min_timeout_ms, combo.max_timeout_ms, &self.signals),
            double_click.clone(),
        ];
        if combo.uses_drag() {
            members.push(DragMonitor::spawn(&combo.drag, event.time, &self.signals));
        }
        let collection = MonitorCollection::new(members);
        debug!(
            tab = %message.tab.id,
            button = combo.button,
            monitors = collection.len(),
            concluded = collection.concluded(),
            "press started interaction"
        );
        let verdict = collection.verdict().clone();

        *self.last.lock() = Some(Interaction {
            double_click,
            verdict: verdict.clone(),
        });
        self.spawn_unload(message.tab.clone(), combo.tree, &verdict);
        suppression(&combo, &verdict)
    }

    /// Forward a release of the combo's button to the running monitors.
    pub fn on_mouse_up(&self, event: &MouseEvent) {
        if event.message.button == self.combo.read().button {
            self.signals.ups.dispatch(event);
        }
    }

    /// Forward a drag start of the combo's button to the running monitors.
    pub fn on_drag_start(&self, event: &MouseEvent) {
        if event.message.button == self.combo.read().button {
            self.signals.drags.dispatch(event);
        }
    }

    /// Abandon the running interaction, if any.
    pub fn cancel(&self) {
        if let Some(interaction) = self.last.lock().take() {
            interaction.verdict.dispose();
        }
    }

    fn spawn_unload(&self, root: Tab, tree: TreeConfig, verdict: &Operation<bool>) {
        let ctx = self.ctx.clone();
        let verdict = verdict.wait();
        tokio::spawn(async move {
            if verdict.await != Ok(true) {
                return;
            }
            let root_id = root.id;
            let targets = match unload_targets(ctx.host.as_ref(), root, &tree).await {
                Ok(targets) => targets,
                Err(e) => {
                    warn!(tab = %root_id, error = %e, "could not collect tree for unload");
                    return;
                }
            };
            if targets.is_empty() {
                return;
            }
            let request = ctx.unload.read().request(targets);
            let report = ctx.coordinator.unload_tabs(request).await;
            debug!(
                tab = %root_id,
                discarded = report.discarded.len(),
                skipped = report.skipped.len(),
                "mouse unload finished"
            );
        });
    }
}

fn suppression(combo: &ComboConfig, verdict: &Operation<bool>) -> Suppress {
    if combo.dont_prevent_default_action {
        Suppress::Decided(false)
    } else {
        Suppress::from_verdict(verdict)
    }
}

async fn unload_targets(
    host: &dyn TabHost,
    root: Tab,
    tree: &TreeConfig,
) -> Result<Vec<TabId>, HostError> {
    if !tree.enabled {
        return Ok(vec![root.id]);
    }
    let mut tabs = host.tree_descendants(root.id).await?;
    if !tree.exclude_root {
        tabs.insert(0, root);
    }
    if tree.exclude_active {
        tabs.retain(|t| !t.active);
    }
    Ok(tabs.into_iter().map(|t| t.id).collect())
}

/// Every configured gate. Events are delivered to all gates in order, so a
/// press reaches every gate before its release does.
pub struct GateSet {
    ctx: GateContext,
    gates: RwLock<Vec<Arc<ButtonGate>>>,
}

impl GateSet {
    /// One gate per combo, in configuration order.
    pub fn new(ctx: GateContext, combos: &[ComboConfig]) -> Self {
        let set = Self {
            ctx,
            gates: RwLock::new(Vec::new()),
        };
        set.apply(combos);
        set
    }

    /// Reconfigure in place: existing gates take the new combo at the same
    /// position, extra gates are added or dropped.
    pub fn apply(&self, combos: &[ComboConfig]) {
        let mut gates = self.gates.write();
        for (i, combo) in combos.iter().enumerate() {
            match gates.get(i) {
                Some(gate) => gate.set_combo(combo.clone()),
                None => gates.push(Arc::new(ButtonGate::new(combo.clone(), self.ctx.clone()))),
            }
        }
        let keep = combos.len().min(gates.len());
        for removed in gates.drain(keep..) {
            removed.cancel();
        }
    }

    /// Number of configured combos.
    pub fn len(&self) -> usize {
        self.gates.read().len()
    }

    fn snapshot(&self) -> Vec<Arc<ButtonGate>> {
        self.gates.read().clone()
    }

    pub fn on_mouse_down(&self, event: &MouseEvent) -> Suppress {
        let decisions = self
            .snapshot()
            .iter()
            .map(|gate| gate.on_mouse_down(event))
            .collect();
        Suppress::any(decisions)
    }

    pub fn on_mouse_up(&self, event: &MouseEvent) {
        for gate in self.snapshot() {
            gate.on_mouse_up(event);
        }
    }

    pub fn on_drag_start(&self, event: &MouseEvent) {
        for gate in self.snapshot() {
            gate.on_drag_start(event);
        }
    }
}
