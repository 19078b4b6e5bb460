//! Subscription hub.
//!
//! The hub keeps one bounded queue per subscription and fans committed
//! updates out to every subscription whose interest set matches. It is
//! driven from inside the store's commit section, so it never blocks:
//! a subscriber whose queue is full is closed with
//! [`ShadowError::BackpressureExceeded`] and dropped from the registry,
//! leaving every other subscriber's ordering untouched.
//!
//! The receiving half, [`Subscription`], is consumed by whatever delivery
//! loop the caller runs (an async task, a thread, a test).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, warn};

use crate::error::{ShadowError, ShadowResult};
use crate::model::SignalUpdate;
use crate::path::SignalPath;

/// Identifier of a subscription, unique for the lifetime of a store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Closed,
}

/// Why the hub closed a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Unsubscribed,
    Backpressure,
}

#[derive(Debug, Default)]
struct SharedState {
    closed: OnceLock<CloseReason>,
}

/// Receiving end of a subscription.
///
/// Yields the baseline updates queued at subscribe time, then live updates
/// in commit order. Dropping the handle ends the subscription; the hub
/// forgets it on its next register or publish.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::Receiver<SignalUpdate>,
    state: Arc<SharedState>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn status(&self) -> SubscriptionStatus {
        if self.state.closed.get().is_some() {
            SubscriptionStatus::Closed
        } else {
            SubscriptionStatus::Active
        }
    }

    /// Wait for the next update.
    ///
    /// After a backpressure close the updates already queued are still
    /// returned before the error; after an unsubscribe nothing more is.
    pub async fn recv(&mut self) -> ShadowResult<SignalUpdate> {
        if self.discard_if_unsubscribed() {
            return Err(ShadowError::SubscriptionClosed);
        }
        match self.rx.recv().await {
            Some(update) => Ok(update),
            None => Err(self.close_error()),
        }
    }

    /// Non-blocking receive. `Ok(None)` means nothing is queued right now.
    pub fn try_recv(&mut self) -> ShadowResult<Option<SignalUpdate>> {
        if self.discard_if_unsubscribed() {
            return Err(ShadowError::SubscriptionClosed);
        }
        match self.rx.try_recv() {
            Ok(update) => Ok(Some(update)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(self.close_error()),
        }
    }

    fn discard_if_unsubscribed(&mut self) -> bool {
        if self.state.closed.get() == Some(&CloseReason::Unsubscribed) {
            self.rx.close();
            while self.rx.try_recv().is_ok() {}
            true
        } else {
            false
        }
    }

    fn close_error(&self) -> ShadowError {
        match self.state.closed.get() {
            Some(CloseReason::Backpressure) => ShadowError::BackpressureExceeded,
            _ => ShadowError::SubscriptionClosed,
        }
    }
}

#[derive(Debug)]
struct Entry {
    interest: BTreeSet<SignalPath>,
    tx: mpsc::Sender<SignalUpdate>,
    state: Arc<SharedState>,
}

impl Entry {
    fn wants(&self, path: &SignalPath) -> bool {
        self.interest.is_empty() || self.interest.contains(path)
    }
}

/// Registry of active subscriptions.
#[derive(Debug)]
pub struct SubscriptionHub {
    next_id: u64,
    capacity: usize,
    entries: BTreeMap<SubscriptionId, Entry>,
}

impl SubscriptionHub {
    /// Create a hub whose subscribers may fall `capacity` updates behind.
    pub fn new(capacity: usize) -> Self {
        Self {
            next_id: 1,
            capacity: capacity.max(1),
            entries: BTreeMap::new(),
        }
    }

    /// Register a subscription and queue its baseline updates.
    ///
    /// The queue is sized so the baseline always fits on top of the
    /// configured live capacity.
    pub fn register(
        &mut self,
        interest: BTreeSet<SignalPath>,
        initial: Vec<SignalUpdate>,
    ) -> Subscription {
        self.prune_dropped();

        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        let (tx, rx) = mpsc::channel(self.capacity + initial.len());
        for update in initial {
            // Cannot fail: the channel is empty and sized for the baseline.
            let _ = tx.try_send(update);
        }

        let path_count = interest.len();
        let state = Arc::new(SharedState::default());
        self.entries.insert(
            id,
            Entry {
                interest,
                tx,
                state: Arc::clone(&state),
            },
        );
        debug!("Registered subscription {} on {} path(s)", id, path_count);

        Subscription {
            id,
            rx,
            state,
        }
    }

    /// Deliver a committed batch, in order, to every matching subscription.
    ///
    /// A subscription receives either every matching entry of the batch or
    /// none of them: one without room for its whole slice is closed with
    /// backpressure before anything is queued.
    pub fn publish(&mut self, updates: &[SignalUpdate]) {
        self.prune_dropped();

        let mut overflowed = Vec::new();
        for (id, entry) in &self.entries {
            let matching: Vec<&SignalUpdate> =
                updates.iter().filter(|u| entry.wants(&u.path)).collect();
            if matching.is_empty() {
                continue;
            }
            // The hub holds the only sender, so free slots cannot shrink
            // between this check and the sends below.
            if entry.tx.capacity() < matching.len() {
                warn!("Subscription {} fell behind, closing", id);
                overflowed.push(*id);
                continue;
            }
            for update in matching {
                if entry.tx.try_send(update.clone()).is_err() {
                    debug!("Subscription {} dropped by its receiver", id);
                    break;
                }
            }
        }

        for id in overflowed {
            self.remove(id, Some(CloseReason::Backpressure));
        }
    }

    /// Close a subscription. Returns false if it was not registered.
    pub fn close(&mut self, id: SubscriptionId, reason: CloseReason) -> bool {
        self.remove(id, Some(reason))
    }

    /// Number of subscriptions whose receiver is still alive.
    pub fn len(&self) -> usize {
        self.entries.values().filter(|e| !e.tx.is_closed()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&mut self, id: SubscriptionId, reason: Option<CloseReason>) -> bool {
        match self.entries.remove(&id) {
            Some(entry) => {
                if let Some(reason) = reason {
                    let _ = entry.state.closed.set(reason);
                }
                true
            }
            None => false,
        }
    }

    fn prune_dropped(&mut self) {
        self.entries.retain(|_, e| !e.tx.is_closed());
    }
}
