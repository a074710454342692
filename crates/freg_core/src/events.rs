//! Store events for observers.
//!
//! Events are emitted only after the mutation that caused them has been
//! committed, so an observer never sees state that a crash could undo.
//! Replayed journal entries do not emit events.
//!
//! ```rust,ignore
//! let subscription = store.subscribe();
//! std::thread::spawn(move || {
//!     while let Ok(event) = subscription.receiver.recv() {
//!         println!("{event:?}");
//!     }
//! });
//! ```

use crate::types::{ChangeId, GlobalChangeId};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

/// A change-visible mutation of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    /// A change row was inserted.
    ChangeAdded {
        /// The new change.
        id: GlobalChangeId,
        /// Its parent on the same node.
        parent: Option<ChangeId>,
    },
    /// A change became missing.
    MissingAdded(GlobalChangeId),
    /// A missing change was consumed.
    MissingRemoved(GlobalChangeId),
    /// A head was materialized.
    HeadAdded(GlobalChangeId),
    /// A head was superseded or deleted.
    HeadRemoved(GlobalChangeId),
}

/// Handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A live subscription.
#[derive(Debug)]
pub struct Subscription {
    /// Pass to [`EventFeed::unsubscribe`] to stop delivery.
    pub id: SubscriptionId,
    /// Receives every event emitted after subscribing.
    pub receiver: Receiver<StoreEvent>,
}

/// Distributes store events to subscribers.
#[derive(Debug, Default)]
pub struct EventFeed {
    subscribers: RwLock<Vec<(SubscriptionId, Sender<StoreEvent>)>>,
    next_id: AtomicU64,
}

impl EventFeed {
    /// Creates a feed with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to future events.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel();
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, tx));
        Subscription { id, receiver: rx }
    }

    /// Stops delivery to a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sub, _)| *sub != id);
        subscribers.len() != before
    }

    /// Sends events to every subscriber, in order.
    ///
    /// Subscribers whose receiver was dropped are removed.
    pub fn emit_all(&self, events: &[StoreEvent]) {
        if events.is_empty() {
            return;
        }
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|(_, tx)| events.iter().all(|event| tx.send(*event).is_ok()));
    }

    /// Returns the number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}
