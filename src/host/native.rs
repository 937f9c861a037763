//! [`TabHost`] over the native-messaging channel.
//!
//! Each call is sent to the extension as an `Outbound::Call` with a fresh
//! id; the matching `response` message completes it. Calls the extension
//! never answers fail with [`HostError::Timeout`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};

use super::{DiscardBackend, HostError, Tab, TabHost, TabId, TabQuery};
use crate::ipc::protocol::{HostCall, Outbound};

/// How long a host call may stay unanswered.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

type Completion = oneshot::Sender<Result<serde_json::Value, HostError>>;

/// Tab calls forwarded to the extension and answered by `response` messages.
pub struct NativeHost {
    outbound: mpsc::UnboundedSender<Outbound>,
    pending: Mutex<HashMap<u32, Completion>>,
    next_id: AtomicU32,
    timeout: Duration,
}

impl NativeHost {
    pub fn new(outbound: mpsc::UnboundedSender<Outbound>, timeout: Duration) -> Self {
        Self {
            outbound,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            timeout,
        }
    }

    /// Complete the call `id` with the extension's answer. Returns `false`
    /// for ids with no call waiting (answered late or never issued).
    pub fn complete(&self, id: u32, result: Option<serde_json::Value>, error: Option<String>) -> bool {
        let Some(waiter) = self.pending.lock().remove(&id) else {
            return false;
        };
        let outcome = match error {
            Some(message) => Err(HostError::Rejected(message)),
            None => Ok(result.unwrap_or(serde_json::Value::Null)),
        };
        // The caller may have timed out in the meantime.
        let _ = waiter.send(outcome);
        true
    }

    /// Fail every outstanding call; the channel to the extension is gone.
    pub fn disconnect(&self) {
        let waiters: Vec<_> = self.pending.lock().drain().map(|(_, w)| w).collect();
        for waiter in waiters {
            let _ = waiter.send(Err(HostError::Disconnected));
        }
    }

    /// Calls still waiting for an answer.
    pub fn outstanding(&self) -> usize {
        self.pending.lock().len()
    }

    async fn call<R: DeserializeOwned>(&self, call: HostCall) -> Result<R, HostError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        if self.outbound.send(Outbound::Call { id, call }).is_err() {
            self.pending.lock().remove(&id);
            return Err(HostError::Disconnected);
        }

        let value = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => return Err(HostError::Disconnected),
            Err(_) => {
                self.pending.lock().remove(&id);
                tracing::warn!(id, "host call timed out");
                return Err(HostError::Timeout);
            }
        };
        serde_json::from_value(value).map_err(|e| HostError::Malformed(e.to_string()))
    }
}

#[async_trait::async_trait]
impl TabHost for NativeHost {
    async fn get_tab(&self, id: TabId) -> Result<Tab, HostError> {
        self.call::<Option<Tab>>(HostCall::GetTab { tab: id })
            .await?
            .ok_or(HostError::NoSuchTab(id))
    }

    async fn query_tabs(&self, query: TabQuery) -> Result<Vec<Tab>, HostError> {
        self.call(HostCall::QueryTabs { query }).await
    }

    async fn set_active_tab(&self, id: TabId) -> Result<(), HostError> {
        self.call::<serde_json::Value>(HostCall::SetActiveTab { tab: id })
            .await
            .map(drop)
    }

    async fn discard_tabs(&self, ids: &[TabId], backend: DiscardBackend) -> Result<(), HostError> {
        self.call::<serde_json::Value>(HostCall::DiscardTabs {
            tabs: ids.to_vec(),
            backend,
        })
        .await
        .map(drop)
    }

    async fn tree_descendants(&self, id: TabId) -> Result<Vec<Tab>, HostError> {
        self.call(HostCall::TreeDescendants { tab: id }).await
    }
}
