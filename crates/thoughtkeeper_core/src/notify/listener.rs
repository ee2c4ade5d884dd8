//! Turns foreign storage changes into refresh signals.

use super::{RefreshRequired, StorageChange};
use log::debug;

/// Watches one storage key on behalf of a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageListener {
    key: String,
}

impl StorageListener {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns a refresh signal when `change` wrote a value under the watched key.
    ///
    /// Removals do not ask for a refresh: there is nothing new to load.
    pub fn on_storage_change(&self, change: &StorageChange) -> Option<RefreshRequired> {
        if change.key != self.key || change.new_value.is_none() {
            return None;
        }
        debug!(
            "event=refresh_required module=notify status=ok key={} origin={}",
            change.key, change.origin
        );
        Some(RefreshRequired {
            key: change.key.clone(),
        })
    }
}
