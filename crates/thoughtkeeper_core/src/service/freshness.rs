//! Best-effort freshness tracking for contexts without a change transport.
//!
//! # Responsibility
//! - Remember the `lastSaved` marker this context last saw.
//! - Report a refresh when the stored marker moved underneath it.
//!
//! # Invariants
//! - Checking never writes to storage.
//! - A context's own writes are recorded, so they never trigger a refresh.

use crate::clock::{parse_iso, Clock};
use crate::notify::{ChangeBus, RefreshRequired};
use crate::service::document_store::{DocumentStore, StoreResult};
use crate::storage::KeyValueStore;
use log::{debug, info};
use std::time::Duration;
use time::OffsetDateTime;

/// Polling tracker driven by a timer or visibility changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshnessMonitor {
    last_seen: Option<String>,
    poll_interval: Duration,
}

impl FreshnessMonitor {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            last_seen: None,
            poll_interval,
        }
    }

    /// Starts from the marker currently stored, using the store's interval.
    pub fn from_store<S, B, C>(store: &DocumentStore<S, B, C>) -> StoreResult<Self>
    where
        S: KeyValueStore,
        B: ChangeBus,
        C: Clock,
    {
        let mut monitor = Self::new(store.config().poll_interval);
        monitor.observe(store.saved_marker()?);
        Ok(monitor)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn last_seen(&self) -> Option<&str> {
        self.last_seen.as_deref()
    }

    pub fn observe(&mut self, marker: Option<String>) {
        self.last_seen = marker;
    }

    /// Marks a write made by this context as already seen.
    pub fn record_local_write(&mut self, last_saved: &str) {
        self.last_seen = Some(last_saved.to_string());
    }

    /// Compares the stored marker with the remembered one.
    ///
    /// Returns `Some` at most once per foreign write.
    pub fn check_for_updates<S, B, C>(
        &mut self,
        store: &DocumentStore<S, B, C>,
    ) -> StoreResult<Option<RefreshRequired>>
    where
        S: KeyValueStore,
        B: ChangeBus,
        C: Clock,
    {
        let stored = store.saved_marker()?;
        if stored == self.last_seen {
            debug!("event=freshness_check module=freshness status=ok changed=false");
            return Ok(None);
        }

        info!(
            "event=freshness_check module=freshness status=ok changed=true marker={}",
            stored.as_deref().unwrap_or("none")
        );
        self.last_seen = stored;
        Ok(Some(RefreshRequired {
            key: store.config().canonical_key.clone(),
        }))
    }

    /// Checks only when the context becomes visible again.
    pub fn on_visibility_change<S, B, C>(
        &mut self,
        visible: bool,
        store: &DocumentStore<S, B, C>,
    ) -> StoreResult<Option<RefreshRequired>>
    where
        S: KeyValueStore,
        B: ChangeBus,
        C: Clock,
    {
        if !visible {
            return Ok(None);
        }
        self.check_for_updates(store)
    }
}

/// Human-readable age of a `lastSaved` stamp.
///
/// `None` when the stamp does not parse. Future stamps read as "just now".
pub fn describe_data_age(last_saved: &str, now: OffsetDateTime) -> Option<String> {
    let saved = parse_iso(last_saved)?;
    let minutes = (now - saved).whole_minutes();
    let hours = minutes / 60;
    let text = if hours > 0 {
        format!("{hours} hours ago")
    } else if minutes > 0 {
        format!("{minutes} minutes ago")
    } else {
        "just now".to_string()
    };
    Some(text)
}
