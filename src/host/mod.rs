//! Host tab API: the browser operations the unload engine depends on.
//!
//! [`TabHost`] is the seam between decision logic and the browser. The
//! daemon implements it with [`native::NativeHost`], which forwards calls
//! to the extension over the native-messaging channel; tests use in-memory
//! hosts.

#[cfg(test)]
pub mod mock;
pub mod native;
pub mod tab;

pub use tab::{DiscardBackend, Tab, TabId, TabQuery};

/// Host call failures. All are recoverable at the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// The tab no longer exists (closed mid-operation).
    #[error("no tab with id {0}")]
    NoSuchTab(TabId),
    /// The browser rejected the call.
    #[error("host call failed: {0}")]
    Rejected(String),
    #[error("host call timed out")]
    Timeout,
    /// The channel to the browser is gone.
    #[error("host disconnected")]
    Disconnected,
    #[error("malformed host response: {0}")]
    Malformed(String),
}

/// Browser tab operations.
///
/// `Send + Sync` because calls are issued from spawned tasks.
#[async_trait::async_trait]
pub trait TabHost: Send + Sync {
    async fn get_tab(&self, id: TabId) -> Result<Tab, HostError>;

    async fn query_tabs(&self, query: TabQuery) -> Result<Vec<Tab>, HostError>;

    async fn set_active_tab(&self, id: TabId) -> Result<(), HostError>;

    async fn discard_tabs(&self, ids: &[TabId], backend: DiscardBackend) -> Result<(), HostError>;

    /// Every descendant of `id` in the tree sidebar, in tree order.
    async fn tree_descendants(&self, id: TabId) -> Result<Vec<Tab>, HostError>;
}
