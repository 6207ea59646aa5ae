#![forbid(unsafe_code)]

//! Transport wrapper that buffers while closed and flushes in order.
//!
//! # Design
//!
//! [`GatedDispatcher<T>`] combines a gate predicate, a pause flag, a shared
//! [`BoundedBuffer`], and a transport callback. While the gate is open and the
//! dispatcher is not paused, payloads go straight to the transport. Otherwise
//! they are buffered. Opening the gate (followed by [`flush`](GatedDispatcher::flush))
//! or [`resume`](GatedDispatcher::resume) delivers the backlog once, in
//! enqueue order.
//!
//! # Invariants
//!
//! 1. A payload reaches the transport at most once.
//! 2. Buffered payloads reach the transport in enqueue order, before any
//!    payload dispatched while the flush is running.
//! 3. Buffer borrows are never held while the transport runs, so the
//!    transport may dispatch again.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::bounded_buffer::{BoundedBuffer, flush_shared};

/// What [`GatedDispatcher::dispatch`] did with a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handed to the transport.
    Delivered,
    /// Queued until the gate opens.
    Buffered,
}

type Gate = Box<dyn Fn() -> bool>;
type Transport<T> = Rc<dyn Fn(T)>;

/// Gate-controlled dispatcher.
pub struct GatedDispatcher<T> {
    gate: Gate,
    buffer: Rc<RefCell<BoundedBuffer<T>>>,
    transport: Transport<T>,
    paused: Cell<bool>,
    flushing: Cell<bool>,
    delivered: Cell<u64>,
}

impl<T> fmt::Debug for GatedDispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatedDispatcher")
            .field("paused", &self.paused.get())
            .field("buffered", &self.buffer.borrow().len())
            .field("delivered", &self.delivered.get())
            .finish()
    }
}

impl<T> GatedDispatcher<T> {
    /// Wrap `transport` behind `gate`, buffering into `buffer`.
    pub fn new(
        gate: impl Fn() -> bool + 'static,
        buffer: BoundedBuffer<T>,
        transport: impl Fn(T) + 'static,
    ) -> Self {
        Self {
            gate: Box::new(gate),
            buffer: Rc::new(RefCell::new(buffer)),
            transport: Rc::new(transport),
            paused: Cell::new(false),
            flushing: Cell::new(false),
            delivered: Cell::new(0),
        }
    }

    /// Whether a dispatch right now would reach the transport.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.paused.get() && (self.gate)()
    }

    /// Deliver `payload` now if open, otherwise buffer it.
    pub fn dispatch(&self, payload: T) -> DispatchOutcome {
        if self.is_open() && !self.flushing.get() {
            self.deliver(payload);
            DispatchOutcome::Delivered
        } else {
            self.buffer.borrow_mut().push(payload);
            DispatchOutcome::Buffered
        }
    }

    /// Stop delivering; subsequent dispatches are buffered.
    pub fn pause(&self) {
        self.paused.set(true);
    }

    /// Resume delivery and flush anything buffered while paused.
    ///
    /// Returns the number of payloads flushed. If the gate itself is still
    /// closed nothing is flushed.
    pub fn resume(&self) -> usize {
        self.paused.set(false);
        self.flush()
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.get()
    }

    /// Whether a [`flush`](Self::flush) is delivering the backlog right now.
    #[must_use]
    pub fn is_flushing(&self) -> bool {
        self.flushing.get()
    }

    /// Deliver the backlog if open. Returns the number delivered.
    ///
    /// Payloads dispatched by the transport during the flush are appended to
    /// the backlog and delivered by the same call, after everything queued
    /// before them.
    pub fn flush(&self) -> usize {
        if !self.is_open() || self.flushing.replace(true) {
            return 0;
        }
        let mut total = 0;
        loop {
            let round = flush_shared(&self.buffer, |payload| self.deliver(payload));
            total += round;
            if round == 0 || !self.is_open() {
                break;
            }
        }
        self.flushing.set(false);
        if total > 0 {
            tracing::debug!(flushed = total, "buffered events delivered");
        }
        total
    }

    /// Drop the backlog without delivering it. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        self.buffer.borrow_mut().clear()
    }

    /// Number of buffered payloads.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.borrow().len()
    }

    /// Payloads handed to the transport so far.
    #[must_use]
    pub fn delivered_count(&self) -> u64 {
        self.delivered.get()
    }

    /// Shared handle to the backlog buffer.
    #[must_use]
    pub fn buffer(&self) -> Rc<RefCell<BoundedBuffer<T>>> {
        Rc::clone(&self.buffer)
    }

    fn deliver(&self, payload: T) {
        self.delivered.set(self.delivered.get() + 1);
        let transport = Rc::clone(&self.transport);
        transport(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounded_buffer::BufferLimits;
    use pretty_assertions::assert_eq;

    type Log = Rc<RefCell<Vec<u32>>>;

    fn dispatcher(open: Rc<Cell<bool>>, log: Log) -> GatedDispatcher<u32> {
        GatedDispatcher::new(
            move || open.get(),
            BoundedBuffer::new(BufferLimits::default()),
            move |v| log.borrow_mut().push(v),
        )
    }

    #[test]
    fn open_gate_passes_through() {
        let log: Log = Rc::default();
        let d = dispatcher(Rc::new(Cell::new(true)), Rc::clone(&log));
        assert_eq!(d.dispatch(1), DispatchOutcome::Delivered);
        assert_eq!(*log.borrow(), vec![1]);
        assert_eq!(d.buffered_len(), 0);
    }

    #[test]
    fn closed_gate_buffers_until_flush() {
        let open = Rc::new(Cell::new(false));
        let log: Log = Rc::default();
        let d = dispatcher(Rc::clone(&open), Rc::clone(&log));
        assert_eq!(d.dispatch(1), DispatchOutcome::Buffered);
        assert_eq!(d.dispatch(2), DispatchOutcome::Buffered);
        assert_eq!(d.flush(), 0);
        assert!(log.borrow().is_empty());

        open.set(true);
        assert_eq!(d.flush(), 2);
        assert_eq!(d.flush(), 0);
        d.dispatch(3);
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
        assert_eq!(d.delivered_count(), 3);
    }

    #[test]
    fn pause_and_resume_preserve_order() {
        let log: Log = Rc::default();
        let d = dispatcher(Rc::new(Cell::new(true)), Rc::clone(&log));
        d.dispatch(1);
        d.pause();
        d.dispatch(2);
        d.dispatch(3);
        assert_eq!(*log.borrow(), vec![1]);
        assert_eq!(d.resume(), 2);
        d.dispatch(4);
        assert_eq!(*log.borrow(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn resume_with_closed_gate_keeps_backlog() {
        let open = Rc::new(Cell::new(false));
        let log: Log = Rc::default();
        let d = dispatcher(Rc::clone(&open), Rc::clone(&log));
        d.pause();
        d.dispatch(1);
        assert_eq!(d.resume(), 0);
        assert_eq!(d.buffered_len(), 1);
    }

    #[test]
    fn transport_dispatching_during_flush_keeps_order() {
        let open = Rc::new(Cell::new(false));
        let log: Log = Rc::default();
        let slot: Rc<RefCell<Option<Rc<GatedDispatcher<u32>>>>> = Rc::default();
        let gate = Rc::clone(&open);
        let sink = Rc::clone(&log);
        let back_ref = Rc::clone(&slot);
        let d = Rc::new(GatedDispatcher::new(
            move || gate.get(),
            BoundedBuffer::new(BufferLimits::default()),
            move |v: u32| {
                sink.borrow_mut().push(v);
                if v == 1 {
                    if let Some(d) = back_ref.borrow().as_ref() {
                        d.dispatch(100);
                    }
                }
            },
        ));
        *slot.borrow_mut() = Some(Rc::clone(&d));

        d.dispatch(1);
        d.dispatch(2);
        open.set(true);
        assert_eq!(d.flush(), 3);
        assert_eq!(*log.borrow(), vec![1, 2, 100]);
        slot.borrow_mut().take();
    }

    #[test]
    fn clear_drops_backlog() {
        let log: Log = Rc::default();
        let d = dispatcher(Rc::new(Cell::new(false)), Rc::clone(&log));
        d.dispatch(1);
        assert_eq!(d.clear(), 1);
        assert_eq!(d.buffered_len(), 0);
    }
}
