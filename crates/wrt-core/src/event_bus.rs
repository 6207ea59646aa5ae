#![forbid(unsafe_code)]

//! Typed publish/subscribe registry keyed by channel name.
//!
//! # Design
//!
//! [`EventBus<E>`] stores listeners per channel in shared storage
//! (`Rc<RefCell<..>>`). Emission snapshots the live listeners first and
//! releases the borrow before invoking them, so a listener may subscribe,
//! unsubscribe, or emit again without tripping `RefCell` borrow rules.
//!
//! # Invariants
//!
//! 1. Listeners on one channel are invoked in registration order.
//! 2. A listener removed during an emission is not invoked by *later*
//!    emissions; the in-flight emission still sees its snapshot.
//! 3. [`ListenerId`]s are never reused within one bus.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Raw numeric value, for logging.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

type Callback<E> = Rc<dyn Fn(&E)>;

struct BusInner<E> {
    next_id: u64,
    channels: HashMap<&'static str, Vec<(ListenerId, Callback<E>)>>,
}

/// A shared, typed event bus.
///
/// Cloning an `EventBus` creates a new handle to the **same** listener table.
pub struct EventBus<E> {
    inner: Rc<RefCell<BusInner<E>>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        let mut map = f.debug_map();
        for (channel, listeners) in &inner.channels {
            map.entry(channel, &listeners.len());
        }
        map.finish()
    }
}

impl<E> EventBus<E> {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(BusInner {
                next_id: 1,
                channels: HashMap::new(),
            })),
        }
    }

    /// Register `callback` on `channel`.
    pub fn on(&self, channel: &'static str, callback: impl Fn(&E) + 'static) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        inner
            .channels
            .entry(channel)
            .or_default()
            .push((id, Rc::new(callback)));
        id
    }

    /// Remove the listener `id` from `channel`. Returns `true` if it was present.
    pub fn off(&self, channel: &'static str, id: ListenerId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let Some(listeners) = inner.channels.get_mut(channel) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            inner.channels.remove(channel);
        }
        removed
    }

    /// Invoke every listener on `channel` with `event`.
    ///
    /// Returns the number of listeners invoked.
    pub fn emit(&self, channel: &'static str, event: &E) -> usize {
        let callbacks: Vec<Callback<E>> = {
            let inner = self.inner.borrow();
            match inner.channels.get(channel) {
                Some(listeners) => listeners.iter().map(|(_, cb)| Rc::clone(cb)).collect(),
                None => return 0,
            }
        };
        for callback in &callbacks {
            callback(event);
        }
        callbacks.len()
    }

    /// Number of listeners on `channel`.
    #[must_use]
    pub fn listener_count(&self, channel: &'static str) -> usize {
        self.inner
            .borrow()
            .channels
            .get(channel)
            .map_or(0, Vec::len)
    }

    /// Drop every listener on every channel.
    pub fn clear(&self) {
        self.inner.borrow_mut().channels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    #[test]
    fn emit_reaches_listeners_in_order() {
        let bus: EventBus<u32> = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let log = Rc::clone(&log);
            bus.on("tick", move |v| log.borrow_mut().push(format!("{tag}{v}")));
        }
        assert_eq!(bus.emit("tick", &7), 3);
        assert_eq!(*log.borrow(), vec!["a7", "b7", "c7"]);
    }

    #[test]
    fn channels_are_isolated() {
        let bus: EventBus<()> = EventBus::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        bus.on("one", move |_| h.set(h.get() + 1));
        assert_eq!(bus.emit("two", &()), 0);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn off_removes_only_target() {
        let bus: EventBus<()> = EventBus::new();
        let a = bus.on("c", |_| {});
        let _b = bus.on("c", |_| {});
        assert!(bus.off("c", a));
        assert!(!bus.off("c", a));
        assert_eq!(bus.listener_count("c"), 1);
    }

    #[test]
    fn listener_may_reenter_bus() {
        let bus: EventBus<u8> = EventBus::new();
        let inner_bus = bus.clone();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        bus.on("outer", move |_| {
            let h = Rc::clone(&h);
            inner_bus.on("inner", move |_| h.set(h.get() + 1));
            inner_bus.emit("inner", &0);
        });
        bus.emit("outer", &0);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn ids_are_unique() {
        let bus: EventBus<()> = EventBus::new();
        let a = bus.on("x", |_| {});
        bus.off("x", a);
        let b = bus.on("x", |_| {});
        assert_ne!(a, b);
    }

    #[test]
    fn clear_drops_everything() {
        let bus: EventBus<()> = EventBus::new();
        bus.on("x", |_| {});
        bus.on("y", |_| {});
        bus.clear();
        assert_eq!(bus.listener_count("x") + bus.listener_count("y"), 0);
    }
}
