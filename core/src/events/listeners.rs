//! Listener registry shared by the timer and the in-memory event bus
//!
//! Handlers run synchronously in registration order. Emission snapshots the
//! registry first and holds no borrow while a handler runs, so handlers may
//! register, remove, or emit re-entrantly. A failing handler is logged and
//! the remaining handlers still run.

use std::cell::RefCell;
use std::rc::Rc;

/// Error returned by a handler. Logged, never propagated to the emitter.
pub type HandlerError = Box<dyn std::error::Error>;

/// Result type every handler returns.
pub type HandlerResult = Result<(), HandlerError>;

/// Boxed event handler.
pub type Handler<E> = Box<dyn FnMut(&E) -> HandlerResult>;

/// Identifies a registration for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

struct Entry<K, E> {
    id: ListenerId,
    kind: K,
    once: bool,
    handler: Rc<RefCell<Handler<E>>>,
}

struct Registry<K, E> {
    next_id: u64,
    entries: Vec<Entry<K, E>>,
}

/// Registry of handlers keyed by a closed event-kind enum.
pub struct Listeners<K, E> {
    registry: RefCell<Registry<K, E>>,
}

impl<K: Copy + Eq + std::fmt::Debug, E> Listeners<K, E> {
    pub fn new() -> Self {
        Self {
            registry: RefCell::new(Registry {
                next_id: 0,
                entries: Vec::new(),
            }),
        }
    }

    pub fn add(&self, kind: K, handler: Handler<E>) -> ListenerId {
        self.insert(kind, handler, false)
    }

    /// Register a handler that is removed before its first invocation.
    pub fn add_once(&self, kind: K, handler: Handler<E>) -> ListenerId {
        self.insert(kind, handler, true)
    }

    fn insert(&self, kind: K, handler: Handler<E>, once: bool) -> ListenerId {
        let mut registry = self.registry.borrow_mut();
        let id = ListenerId(registry.next_id);
        registry.next_id += 1;
        registry.entries.push(Entry {
            id,
            kind,
            once,
            handler: Rc::new(RefCell::new(handler)),
        });
        id
    }

    /// Remove a registration. Returns `false` if it was already gone.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut registry = self.registry.borrow_mut();
        let before = registry.entries.len();
        registry.entries.retain(|entry| entry.id != id);
        registry.entries.len() != before
    }

    pub fn clear(&self) {
        self.registry.borrow_mut().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.registry.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count(&self, kind: K) -> usize {
        self.registry
            .borrow()
            .entries
            .iter()
            .filter(|entry| entry.kind == kind)
            .count()
    }

    fn contains(&self, id: ListenerId) -> bool {
        self.registry
            .borrow()
            .entries
            .iter()
            .any(|entry| entry.id == id)
    }

    /// Invoke every handler registered for `kind`.
    pub fn emit(&self, kind: K, event: &E) {
        let snapshot: Vec<(ListenerId, bool, Rc<RefCell<Handler<E>>>)> = self
            .registry
            .borrow()
            .entries
            .iter()
            .filter(|entry| entry.kind == kind)
            .map(|entry| (entry.id, entry.once, Rc::clone(&entry.handler)))
            .collect();

        for (id, once, handler) in snapshot {
            // Skip anything removed earlier in this pass; a once handler is
            // unregistered right before it runs.
            let live = if once { self.remove(id) } else { self.contains(id) };
            if !live {
                continue;
            }

            let Ok(mut handler) = handler.try_borrow_mut() else {
                tracing::warn!(?kind, listener = id.0, "skipping re-entrant listener");
                continue;
            };

            if let Err(err) = handler(event) {
                tracing::warn!(?kind, listener = id.0, error = %err, "listener failed");
            }
        }
    }
}

impl<K: Copy + Eq + std::fmt::Debug, E> Default for Listeners<K, E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Kind {
        A,
        B,
    }

    #[test]
    fn test_failing_handler_does_not_stop_others() {
        let listeners: Listeners<Kind, u32> = Listeners::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s = seen.clone();
        listeners.add(Kind::A, Box::new(move |v| {
            s.borrow_mut().push(("first", *v));
            Err("boom".into())
        }));
        let s = seen.clone();
        listeners.add(Kind::A, Box::new(move |v| {
            s.borrow_mut().push(("second", *v));
            Ok(())
        }));
        listeners.add(Kind::B, Box::new(|_| panic!("wrong kind")));

        listeners.emit(Kind::A, &7);
        assert_eq!(*seen.borrow(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn test_once_handler_runs_once() {
        let listeners: Listeners<Kind, ()> = Listeners::new();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        listeners.add_once(Kind::A, Box::new(move |_| {
            c.set(c.get() + 1);
            Ok(())
        }));

        listeners.emit(Kind::A, &());
        listeners.emit(Kind::A, &());
        assert_eq!(count.get(), 1);
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_handler_removed_mid_emit_is_skipped() {
        let listeners: Rc<Listeners<Kind, ()>> = Rc::new(Listeners::new());
        let second_ran = Rc::new(Cell::new(false));
        let victim = Rc::new(Cell::new(None));

        let l = Rc::downgrade(&listeners);
        let v = victim.clone();
        listeners.add(Kind::A, Box::new(move |_| {
            if let (Some(l), Some(id)) = (l.upgrade(), v.get()) {
                l.remove(id);
            }
            Ok(())
        }));
        let ran = second_ran.clone();
        let id = listeners.add(Kind::A, Box::new(move |_| {
            ran.set(true);
            Ok(())
        }));
        victim.set(Some(id));

        listeners.emit(Kind::A, &());
        assert!(!second_ran.get());
        assert!(!listeners.remove(id));
    }

    #[test]
    fn test_once_handler_removed_mid_emit_is_skipped() {
        let listeners: Rc<Listeners<Kind, ()>> = Rc::new(Listeners::new());
        let once_ran = Rc::new(Cell::new(false));
        let victim = Rc::new(Cell::new(None));

        let l = Rc::downgrade(&listeners);
        let v = victim.clone();
        listeners.add(Kind::A, Box::new(move |_| {
            if let (Some(l), Some(id)) = (l.upgrade(), v.get()) {
                assert!(l.remove(id));
            }
            Ok(())
        }));
        let ran = once_ran.clone();
        let id = listeners.add_once(Kind::A, Box::new(move |_| {
            ran.set(true);
            Ok(())
        }));
        victim.set(Some(id));

        listeners.emit(Kind::A, &());
        listeners.emit(Kind::A, &());
        assert!(!once_ran.get());
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn test_once_handler_runs_once_under_nested_emit() {
        let listeners: Rc<Listeners<Kind, ()>> = Rc::new(Listeners::new());
        let count = Rc::new(Cell::new(0));

        let l = Rc::downgrade(&listeners);
        let nested = Rc::new(Cell::new(false));
        let n = nested.clone();
        listeners.add(Kind::A, Box::new(move |_| {
            if !n.replace(true) {
                if let Some(l) = l.upgrade() {
                    l.emit(Kind::A, &());
                }
            }
            Ok(())
        }));
        let c = count.clone();
        listeners.add_once(Kind::A, Box::new(move |_| {
            c.set(c.get() + 1);
            Ok(())
        }));

        listeners.emit(Kind::A, &());
        assert_eq!(count.get(), 1);
        assert_eq!(listeners.count(Kind::A), 1);
    }
}
