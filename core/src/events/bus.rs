//! Battle event bus
//!
//! Replaces a global pub/sub with an injected trait object. The in-memory
//! implementation is the default for hosts that don't bridge to their own
//! event system, and the one used throughout the tests.

use std::rc::Rc;

use super::listeners::{Handler, ListenerId, Listeners};
use super::signal::{BattleEvent, BattleEventKind};

/// Generic publish/subscribe channel for battle events.
pub trait EventBus {
    fn emit(&self, event: &BattleEvent);

    fn subscribe(&self, kind: BattleEventKind, handler: Handler<BattleEvent>) -> ListenerId;

    /// Returns `false` if the subscription was already gone.
    fn unsubscribe(&self, id: ListenerId) -> bool;
}

/// Synchronous in-process bus.
#[derive(Default)]
pub struct InMemoryEventBus {
    listeners: Listeners<BattleEventKind, BattleEvent>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions for `kind`.
    pub fn subscriber_count(&self, kind: BattleEventKind) -> usize {
        self.listeners.count(kind)
    }

    /// Total number of live subscriptions.
    pub fn total_subscribers(&self) -> usize {
        self.listeners.len()
    }
}

impl EventBus for InMemoryEventBus {
    fn emit(&self, event: &BattleEvent) {
        tracing::trace!(?event, "bus emit");
        self.listeners.emit(event.kind(), event);
    }

    fn subscribe(&self, kind: BattleEventKind, handler: Handler<BattleEvent>) -> ListenerId {
        self.listeners.add(kind, handler)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

/// Set of bus subscriptions released together.
///
/// Dropping the set unsubscribes everything it still holds.
pub struct Subscriptions {
    bus: Rc<dyn EventBus>,
    ids: Vec<ListenerId>,
}

impl Subscriptions {
    pub fn new(bus: Rc<dyn EventBus>) -> Self {
        Self {
            bus,
            ids: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, kind: BattleEventKind, handler: Handler<BattleEvent>) {
        let id = self.bus.subscribe(kind, handler);
        self.ids.push(id);
    }

    /// Unsubscribe everything. Safe to call repeatedly.
    pub fn clear(&mut self) {
        for id in self.ids.drain(..) {
            self.bus.unsubscribe(id);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        self.clear();
    }
}
