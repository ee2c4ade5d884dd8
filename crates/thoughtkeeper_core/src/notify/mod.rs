//! Change notification port and event types.
//!
//! # Responsibility
//! - Define what the store announces after a successful write.
//! - Keep the transport abstract: the store only calls `ChangeBus`.
//!
//! # Invariants
//! - Delivery is fire-and-forget and at-most-once; publishing never fails.
//! - Cross-context changes never reach the publishing context, mirroring host
//!   storage-change semantics; same-context notices reach only it.

use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod hub;
pub mod listener;

pub use hub::{ChangeHub, ContextBus, Subscription};
pub use listener::StorageListener;

/// Identity of one execution context (tab, window, process).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ContextId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cross-context signal: a shared key changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
    /// Serialized value after the write; `None` when the key was removed.
    pub new_value: Option<String>,
    pub origin: ContextId,
}

/// Same-context signal: the document was written by this context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataUpdated {
    pub timestamp_ms: i64,
    pub origin: ContextId,
}

/// A foreign write hit the canonical key; views should reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRequired {
    pub key: String,
}

/// Everything a subscriber can observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Storage(StorageChange),
    DataUpdated(DataUpdated),
    RefreshRequired(RefreshRequired),
}

/// Transport the store publishes through.
pub trait ChangeBus {
    fn context_id(&self) -> ContextId;
    fn publish_cross_context(&self, change: StorageChange);
    fn publish_same_context(&self, notice: DataUpdated);

    /// Asks the transport to raise `RefreshRequired` for foreign writes to `key`.
    fn listen_for_refresh(&self, _key: &str) {}
}

impl<T: ChangeBus + ?Sized> ChangeBus for &T {
    fn context_id(&self) -> ContextId {
        (**self).context_id()
    }

    fn publish_cross_context(&self, change: StorageChange) {
        (**self).publish_cross_context(change)
    }

    fn publish_same_context(&self, notice: DataUpdated) {
        (**self).publish_same_context(notice)
    }

    fn listen_for_refresh(&self, key: &str) {
        (**self).listen_for_refresh(key)
    }
}

/// Bus for a lone context: every publish is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBus {
    context: ContextId,
}

impl NullBus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChangeBus for NullBus {
    fn context_id(&self) -> ContextId {
        self.context
    }

    fn publish_cross_context(&self, _change: StorageChange) {}

    fn publish_same_context(&self, _notice: DataUpdated) {}
}
