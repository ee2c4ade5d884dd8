//! In-process change hub connecting several contexts.
//!
//! # Responsibility
//! - Hand out one `ContextBus` per context sharing a storage origin.
//! - Route cross-context changes to every other context, same-context notices
//!   to the publishing context only.
//! - Run each context's `StorageListener` on incoming foreign changes.
//!
//! # Invariants
//! - Publishing never blocks and never fails; disconnected subscribers are
//!   dropped on the next publish.

use super::{
    ChangeBus, ChangeEvent, ContextId, DataUpdated, RefreshRequired, StorageChange,
    StorageListener,
};
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::warn;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Shared routing table. Cheap to clone.
#[derive(Clone, Default)]
pub struct ChangeHub {
    inner: Arc<Mutex<HubState>>,
}

#[derive(Default)]
struct HubState {
    next_subscriber_id: u64,
    subscribers: BTreeMap<u64, SubscriberState>,
    listeners: BTreeMap<ContextId, StorageListener>,
}

struct SubscriberState {
    context: ContextId,
    sender: Sender<ChangeEvent>,
}

impl ChangeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new context and returns its bus.
    pub fn context(&self) -> ContextBus {
        ContextBus {
            hub: self.clone(),
            id: ContextId::new(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_state().map_or(0, |state| state.subscribers.len())
    }

    fn lock_state(&self) -> Option<MutexGuard<'_, HubState>> {
        match self.inner.lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                warn!("event=hub_lock module=notify status=error error_code=lock_poisoned");
                None
            }
        }
    }

    fn subscribe(&self, context: ContextId) -> Subscription {
        let (sender, receiver) = unbounded();
        if let Some(mut state) = self.lock_state() {
            let id = state.next_subscriber_id;
            state.next_subscriber_id = state.next_subscriber_id.saturating_add(1);
            state
                .subscribers
                .insert(id, SubscriberState { context, sender });
        }
        Subscription { receiver }
    }

    fn deliver(&self, event: &ChangeEvent, accepts: impl Fn(ContextId) -> bool) {
        let Some(mut state) = self.lock_state() else {
            return;
        };

        let mut refreshes: Vec<(ContextId, RefreshRequired)> = Vec::new();
        if let ChangeEvent::Storage(change) = event {
            for (context, listener) in &state.listeners {
                if !accepts(*context) {
                    continue;
                }
                if let Some(refresh) = listener.on_storage_change(change) {
                    refreshes.push((*context, refresh));
                }
            }
        }

        let mut dropped = Vec::new();
        for (id, subscriber) in &state.subscribers {
            if !accepts(subscriber.context) {
                continue;
            }
            let mut connected = subscriber.sender.send(event.clone()).is_ok();
            for (context, refresh) in &refreshes {
                if connected && *context == subscriber.context {
                    connected = subscriber
                        .sender
                        .send(ChangeEvent::RefreshRequired(refresh.clone()))
                        .is_ok();
                }
            }
            if !connected {
                dropped.push(*id);
            }
        }

        for id in dropped {
            state.subscribers.remove(&id);
        }
    }
}

/// One context's handle on the hub.
#[derive(Clone)]
pub struct ContextBus {
    hub: ChangeHub,
    id: ContextId,
}

impl ContextBus {
    /// Receives every event routed to this context.
    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe(self.id)
    }
}

impl ChangeBus for ContextBus {
    fn context_id(&self) -> ContextId {
        self.id
    }

    fn publish_cross_context(&self, change: StorageChange) {
        let origin = self.id;
        self.hub
            .deliver(&ChangeEvent::Storage(change), |context| context != origin);
    }

    fn publish_same_context(&self, notice: DataUpdated) {
        let origin = self.id;
        self.hub
            .deliver(&ChangeEvent::DataUpdated(notice), |context| context == origin);
    }

    /// Installs (or replaces) this context's listener.
    fn listen_for_refresh(&self, key: &str) {
        if let Some(mut state) = self.hub.lock_state() {
            state.listeners.insert(self.id, StorageListener::new(key));
        }
    }
}

/// Receiving end of a subscription.
pub struct Subscription {
    receiver: Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn try_recv(&self) -> Option<ChangeEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<ChangeEvent> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Everything queued so far, oldest first.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        self.receiver.try_iter().collect()
    }
}
