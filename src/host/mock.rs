//! In-memory [`TabHost`] for tests.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use super::tab::WindowId;
use super::{DiscardBackend, HostError, Tab, TabHost, TabId, TabQuery};

/// A host call as observed by [`MockHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetTab(TabId),
    QueryTabs(TabQuery),
    SetActive(TabId),
    Discard(Vec<TabId>, DiscardBackend),
    TreeDescendants(TabId),
}

#[derive(Default)]
struct State {
    tabs: Vec<Tab>,
    calls: Vec<Call>,
    /// Discards of these tabs are accepted but silently ignored.
    stubborn: HashSet<TabId>,
    fail_discard: bool,
    fail_activate: bool,
    tree: HashMap<TabId, Vec<TabId>>,
}

#[derive(Default)]
pub struct MockHost {
    state: Mutex<State>,
}

impl MockHost {
    /// A single window holding `count` loaded tabs with ids `1..=count`;
    /// tab `active` is the active one. `last_accessed` grows with the id.
    pub fn window(count: u64, active: u64) -> Self {
        let tabs = (1..=count)
            .map(|id| tab(id, (id - 1) as usize, id == active))
            .collect();
        Self::with_tabs(tabs)
    }

    pub fn with_tabs(tabs: Vec<Tab>) -> Self {
        Self {
            state: Mutex::new(State {
                tabs,
                ..State::default()
            }),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn discard_calls(&self) -> Vec<Vec<TabId>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Discard(ids, _) => Some(ids),
                _ => None,
            })
            .collect()
    }

    pub fn activations(&self) -> Vec<TabId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SetActive(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn tab(&self, id: TabId) -> Option<Tab> {
        self.state.lock().tabs.iter().find(|t| t.id == id).cloned()
    }

    pub fn update(&self, id: TabId, f: impl FnOnce(&mut Tab)) {
        if let Some(tab) = self.state.lock().tabs.iter_mut().find(|t| t.id == id) {
            f(tab);
        }
    }

    pub fn make_stubborn(&self, id: TabId) {
        self.state.lock().stubborn.insert(id);
    }

    pub fn fail_discards(&self) {
        self.state.lock().fail_discard = true;
    }

    pub fn fail_activations(&self) {
        self.state.lock().fail_activate = true;
    }

    pub fn set_children(&self, parent: TabId, children: Vec<TabId>) {
        self.state.lock().tree.insert(parent, children);
    }
}

pub fn tab(id: u64, index: usize, active: bool) -> Tab {
    Tab {
        id: TabId(id),
        window_id: WindowId(1),
        index,
        active,
        discarded: false,
        hidden: false,
        pinned: false,
        last_accessed: 1_000 + id,
    }
}

#[async_trait::async_trait]
impl TabHost for MockHost {
    async fn get_tab(&self, id: TabId) -> Result<Tab, HostError> {
        let mut state = self.state.lock();
        state.calls.push(Call::GetTab(id));
        state
            .tabs
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or(HostError::NoSuchTab(id))
    }

    async fn query_tabs(&self, query: TabQuery) -> Result<Vec<Tab>, HostError> {
        let mut state = self.state.lock();
        let tabs = state
            .tabs
            .iter()
            .filter(|t| query.matches(t))
            .cloned()
            .collect();
        state.calls.push(Call::QueryTabs(query));
        Ok(tabs)
    }

    async fn set_active_tab(&self, id: TabId) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state.calls.push(Call::SetActive(id));
        if state.fail_activate {
            return Err(HostError::Rejected("activation refused".into()));
        }
        let window = state
            .tabs
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.window_id)
            .ok_or(HostError::NoSuchTab(id))?;
        for tab in state.tabs.iter_mut().filter(|t| t.window_id == window) {
            tab.active = tab.id == id;
            if tab.active {
                tab.discarded = false;
            }
        }
        Ok(())
    }

    async fn discard_tabs(&self, ids: &[TabId], backend: DiscardBackend) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state.calls.push(Call::Discard(ids.to_vec(), backend));
        if state.fail_discard {
            return Err(HostError::Rejected("discard refused".into()));
        }
        let stubborn = state.stubborn.clone();
        for tab in state.tabs.iter_mut() {
            if ids.contains(&tab.id) && !tab.active && !stubborn.contains(&tab.id) {
                tab.discarded = true;
            }
        }
        Ok(())
    }

    async fn tree_descendants(&self, id: TabId) -> Result<Vec<Tab>, HostError> {
        let mut state = self.state.lock();
        state.calls.push(Call::TreeDescendants(id));
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if next != id {
                order.push(next);
            }
            if let Some(children) = state.tree.get(&next) {
                stack.extend(children.iter().rev().copied());
            }
        }
        Ok(order
            .into_iter()
            .filter_map(|cid| state.tabs.iter().find(|t| t.id == cid).cloned())
            .collect())
    }
}
