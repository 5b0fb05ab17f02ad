//! Listener registry backing the database handle's event surface.
//!
//! The registry replaces ad-hoc emitter inheritance with an explicit table:
//! listeners fire in subscription order, can be removed individually, and
//! are dropped wholesale when the owning connection closes. Dispatch clones
//! the listener list first so a callback may subscribe/unsubscribe without
//! invalidating the current emission.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Lifecycle events re-emitted by a [`Database`](crate::Database) handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Another connection wants a newer version.
    VersionChange,
    /// A transaction on this connection rolled back.
    Abort,
    /// An operation on this connection failed.
    Error,
}

/// Token returned by `subscribe`, used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type Callback<E> = Rc<dyn Fn(&E)>;

pub(crate) struct EventRegistry<E> {
    next_id: Cell<u64>,
    listeners: RefCell<Vec<(ListenerId, EventKind, Callback<E>)>>,
}

impl<E> Default for EventRegistry<E> {
    fn default() -> Self {
        Self {
            next_id: Cell::new(0),
            listeners: RefCell::new(Vec::new()),
        }
    }
}

impl<E> EventRegistry<E> {
    pub fn subscribe(&self, kind: EventKind, callback: impl Fn(&E) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        self.listeners
            .borrow_mut()
            .push((id, kind, Rc::new(callback)));
        id
    }

    /// Removes one listener; returns whether it was still registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(lid, _, _)| *lid != id);
        listeners.len() != before
    }

    pub fn emit(&self, kind: EventKind, event: &E) {
        // Snapshot under the borrow, invoke outside it.
        let snapshot: Vec<Callback<E>> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, cb)| Rc::clone(cb))
            .collect();
        for callback in snapshot {
            callback(event);
        }
    }

    pub fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listeners_fire_in_subscription_order() {
        let registry: EventRegistry<String> = EventRegistry::default();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = Rc::clone(&seen);
            registry.subscribe(EventKind::Error, move |event: &String| {
                seen.borrow_mut().push(format!("{tag}:{event}"));
            });
        }
        registry.emit(EventKind::Error, &"boom".to_owned());

        assert_eq!(*seen.borrow(), vec!["a:boom", "b:boom", "c:boom"]);
    }

    #[test]
    fn emit_only_reaches_matching_kind() {
        let registry: EventRegistry<u32> = EventRegistry::default();
        let hits = Rc::new(Cell::new(0u32));

        let hits2 = Rc::clone(&hits);
        registry.subscribe(EventKind::Abort, move |_| hits2.set(hits2.get() + 1));
        registry.subscribe(EventKind::VersionChange, |_| panic!("wrong kind"));

        registry.emit(EventKind::Abort, &0);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn unsubscribe_removes_exactly_one_listener() {
        let registry: EventRegistry<u32> = EventRegistry::default();
        let hits = Rc::new(Cell::new(0u32));

        let hits1 = Rc::clone(&hits);
        let first = registry.subscribe(EventKind::Error, move |_| hits1.set(hits1.get() + 1));
        let hits2 = Rc::clone(&hits);
        registry.subscribe(EventKind::Error, move |_| hits2.set(hits2.get() + 10));

        assert!(registry.unsubscribe(first));
        assert!(!registry.unsubscribe(first));

        registry.emit(EventKind::Error, &0);
        assert_eq!(hits.get(), 10);
    }

    #[test]
    fn subscribing_during_dispatch_does_not_see_current_event() {
        let registry: Rc<EventRegistry<u32>> = Rc::new(EventRegistry::default());
        let late_hits = Rc::new(Cell::new(0u32));

        let registry2 = Rc::clone(&registry);
        let late_hits2 = Rc::clone(&late_hits);
        registry.subscribe(EventKind::Error, move |_| {
            let late_hits3 = Rc::clone(&late_hits2);
            registry2.subscribe(EventKind::Error, move |_| {
                late_hits3.set(late_hits3.get() + 1)
            });
        });

        registry.emit(EventKind::Error, &0);
        assert_eq!(late_hits.get(), 0);

        registry.emit(EventKind::Error, &0);
        assert_eq!(late_hits.get(), 1);
    }

    #[test]
    fn clear_drops_everything() {
        let registry: EventRegistry<u32> = EventRegistry::default();
        registry.subscribe(EventKind::Error, |_| panic!("cleared"));
        registry.clear();
        registry.emit(EventKind::Error, &0);
    }
}
