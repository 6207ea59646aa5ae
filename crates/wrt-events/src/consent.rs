#![forbid(unsafe_code)]

//! Consent gate: a pending/granted state machine in front of analytics.
//!
//! Every analytics emission point goes through [`ConsentGate::enqueue`].
//! While consent is pending, payloads are buffered in a [`BoundedBuffer`];
//! [`grant`](ConsentGate::grant) flushes them through the transport exactly
//! once, in enqueue order. [`revoke`](ConsentGate::revoke) only affects
//! future payloads: nothing already delivered is recalled.
//!
//! State changes are published on an [`EventBus`] so banners or host
//! integrations can follow along.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use wrt_core::{EventBus, ListenerId};

use crate::bounded_buffer::{BoundedBuffer, BufferLimits};
use crate::dispatcher::{DispatchOutcome, GatedDispatcher};

const CONSENT_CHANGED: &str = "consent:changed";

/// Consent state. `Pending` unless explicitly granted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentState {
    #[default]
    Pending,
    Granted,
}

/// Who granted consent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentSource {
    /// The visitor accepted in the embed's own prompt.
    User,
    /// The host page's consent manager signalled approval.
    Host,
    /// Granted up-front by runtime configuration.
    Config,
    /// Anything else, by name.
    Other(String),
}

impl fmt::Display for ConsentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Host => f.write_str("host"),
            Self::Config => f.write_str("config"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// Notification published on every state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentChange {
    pub state: ConsentState,
    /// Set for grants, `None` for revocations.
    pub source: Option<ConsentSource>,
    /// Payloads flushed by this change (grants only).
    pub flushed: usize,
}

/// Pending/granted gate around an analytics transport.
pub struct ConsentGate<T> {
    state: Rc<Cell<ConsentState>>,
    dispatcher: GatedDispatcher<T>,
    changes: EventBus<ConsentChange>,
}

impl<T> fmt::Debug for ConsentGate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsentGate")
            .field("state", &self.state.get())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl<T: Serialize + 'static> ConsentGate<T> {
    /// Create a pending gate with JSON-sized buffering.
    pub fn new(limits: BufferLimits, transport: impl Fn(T) + 'static) -> Self {
        Self::with_buffer(BoundedBuffer::new(limits), transport, ConsentState::Pending)
    }
}

impl<T> ConsentGate<T> {
    /// Create a gate over an explicit buffer, starting in `initial`.
    pub fn with_buffer(
        buffer: BoundedBuffer<T>,
        transport: impl Fn(T) + 'static,
        initial: ConsentState,
    ) -> Self {
        let state = Rc::new(Cell::new(initial));
        let gate_state = Rc::clone(&state);
        let dispatcher = GatedDispatcher::new(
            move || gate_state.get() == ConsentState::Granted,
            buffer,
            transport,
        );
        Self {
            state,
            dispatcher,
            changes: EventBus::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> ConsentState {
        self.state.get()
    }

    #[must_use]
    pub fn is_granted(&self) -> bool {
        self.state.get() == ConsentState::Granted
    }

    /// Grant consent and flush the backlog.
    ///
    /// No-op when already granted. Returns `true` if the state changed.
    pub fn grant(&self, source: ConsentSource) -> bool {
        if self.is_granted() {
            return false;
        }
        self.state.set(ConsentState::Granted);
        let flushed = self.dispatcher.flush();
        tracing::info!(%source, flushed, "analytics consent granted");
        self.changes.emit(
            CONSENT_CHANGED,
            &ConsentChange {
                state: ConsentState::Granted,
                source: Some(source),
                flushed,
            },
        );
        true
    }

    /// Return to pending. Already-delivered payloads are not recalled.
    ///
    /// No-op when already pending. Returns `true` if the state changed.
    pub fn revoke(&self) -> bool {
        if !self.is_granted() {
            return false;
        }
        self.state.set(ConsentState::Pending);
        tracing::info!("analytics consent revoked");
        self.changes.emit(
            CONSENT_CHANGED,
            &ConsentChange {
                state: ConsentState::Pending,
                source: None,
                flushed: 0,
            },
        );
        true
    }

    /// Route one payload.
    ///
    /// Granted: `dispatcher(payload)` runs synchronously. Pending: the payload
    /// is buffered and later delivered through the gate's own transport.
    ///
    /// A payload enqueued while the backlog is still being flushed (for
    /// example by the transport itself) is queued behind it and delivered
    /// through the gate's transport by the running flush.
    pub fn enqueue(&self, payload: T, dispatcher: impl FnOnce(T)) -> DispatchOutcome {
        if self.is_granted() {
            if self.dispatcher.is_flushing() {
                return self.dispatcher.dispatch(payload);
            }
            if self.dispatcher.buffered_len() > 0 {
                self.dispatcher.flush();
            }
            dispatcher(payload);
            return DispatchOutcome::Delivered;
        }
        let outcome = self.dispatcher.dispatch(payload);
        let buffer = self.dispatcher.buffer();
        let buffer = buffer.borrow();
        tracing::debug!(
            pending = buffer.len(),
            bytes = buffer.total_bytes(),
            "consent pending; analytics event buffered"
        );
        outcome
    }

    /// Route one payload through the gate's own transport.
    pub fn dispatch(&self, payload: T) -> DispatchOutcome {
        if self.is_granted() {
            self.dispatcher.dispatch(payload)
        } else {
            self.enqueue(payload, |_| {})
        }
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self, callback: impl Fn(&ConsentChange) + 'static) -> ListenerId {
        self.changes.on(CONSENT_CHANGED, callback)
    }

    /// Remove a subscription. Returns `true` if it existed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.changes.off(CONSENT_CHANGED, id)
    }

    /// Buffered payloads awaiting consent.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.dispatcher.buffered_len()
    }

    /// Drop buffered payloads without delivering them (hard reset).
    pub fn clear(&self) -> usize {
        self.dispatcher.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    type Log = Rc<RefCell<Vec<&'static str>>>;

    fn gate(log: &Log) -> ConsentGate<&'static str> {
        let sink = Rc::clone(log);
        ConsentGate::new(BufferLimits::default(), move |p| sink.borrow_mut().push(p))
    }

    #[test]
    fn starts_pending() {
        let log: Log = Rc::default();
        assert_eq!(gate(&log).state(), ConsentState::Pending);
    }

    #[test]
    fn grant_is_idempotent() {
        let log: Log = Rc::default();
        let g = gate(&log);
        assert!(g.grant(ConsentSource::User));
        assert!(!g.grant(ConsentSource::Host));
    }

    #[test]
    fn revoke_when_pending_is_noop() {
        let log: Log = Rc::default();
        let g = gate(&log);
        let notified = Rc::new(Cell::new(0));
        let n = Rc::clone(&notified);
        g.subscribe(move |_| n.set(n.get() + 1));
        assert!(!g.revoke());
        assert_eq!(notified.get(), 0);
    }

    #[test]
    fn granted_enqueue_uses_caller_dispatcher() {
        let log: Log = Rc::default();
        let g = ConsentGate::with_buffer(
            BoundedBuffer::new(BufferLimits::default()),
            |_: &'static str| panic!("gate transport must not be used"),
            ConsentState::Granted,
        );
        let direct = Rc::clone(&log);
        let outcome = g.enqueue("pageview", move |p| direct.borrow_mut().push(p));
        assert_eq!(outcome, DispatchOutcome::Delivered);
        assert_eq!(*log.borrow(), vec!["pageview"]);
    }

    #[test]
    fn enqueue_from_transport_during_grant_waits_for_backlog() {
        let log: Rc<RefCell<Vec<u32>>> = Rc::default();
        let slot: Rc<RefCell<Option<Rc<ConsentGate<u32>>>>> = Rc::default();
        let sink = Rc::clone(&log);
        let back_ref = Rc::clone(&slot);
        let g = Rc::new(ConsentGate::new(BufferLimits::default(), move |v: u32| {
            sink.borrow_mut().push(v);
            if v == 1 {
                if let Some(g) = back_ref.borrow().as_ref() {
                    let direct = Rc::clone(&sink);
                    let outcome = g.enqueue(100, move |p| direct.borrow_mut().push(p));
                    assert_eq!(outcome, DispatchOutcome::Buffered);
                }
            }
        }));
        *slot.borrow_mut() = Some(Rc::clone(&g));

        g.enqueue(1, |_| {});
        g.enqueue(2, |_| {});
        assert!(g.grant(ConsentSource::User));
        assert_eq!(*log.borrow(), vec![1, 2, 100]);
        assert_eq!(g.pending_len(), 0);

        let direct = Rc::clone(&log);
        assert_eq!(
            g.enqueue(3, move |p| direct.borrow_mut().push(p)),
            DispatchOutcome::Delivered
        );
        assert_eq!(*log.borrow(), vec![1, 2, 100, 3]);
        slot.borrow_mut().take();
    }

    #[test]
    fn subscribers_see_grant_and_revoke() {
        let log: Log = Rc::default();
        let g = gate(&log);
        let changes = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&changes);
        let id = g.subscribe(move |change| sink.borrow_mut().push(change.clone()));

        g.enqueue("a", |_| {});
        g.grant(ConsentSource::Host);
        g.revoke();
        assert!(g.unsubscribe(id));
        g.grant(ConsentSource::User);

        assert_eq!(
            *changes.borrow(),
            vec![
                ConsentChange {
                    state: ConsentState::Granted,
                    source: Some(ConsentSource::Host),
                    flushed: 1,
                },
                ConsentChange {
                    state: ConsentState::Pending,
                    source: None,
                    flushed: 0,
                },
            ]
        );
    }

    #[test]
    fn clear_discards_pending() {
        let log: Log = Rc::default();
        let g = gate(&log);
        g.enqueue("a", |_| {});
        assert_eq!(g.clear(), 1);
        g.grant(ConsentSource::User);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn source_display() {
        assert_eq!(ConsentSource::Other("cmp".into()).to_string(), "cmp");
        assert_eq!(ConsentSource::Config.to_string(), "config");
    }
}
