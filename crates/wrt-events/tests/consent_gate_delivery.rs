#![forbid(unsafe_code)]

//! Delivery guarantees of the consent gate and its bounded buffer.
//!
//! Run:
//!   cargo test -p wrt-events --test consent_gate_delivery

use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use wrt_events::{
    BoundedBuffer, BufferLimits, ConsentGate, ConsentSource, ConsentState, DispatchOutcome,
};

type Delivered = Rc<RefCell<Vec<u32>>>;

fn gate_with_log(limits: BufferLimits) -> (ConsentGate<u32>, Delivered) {
    let delivered: Delivered = Rc::default();
    let sink = Rc::clone(&delivered);
    let gate = ConsentGate::new(limits, move |event| sink.borrow_mut().push(event));
    (gate, delivered)
}

#[test]
fn buffer_with_three_slots_keeps_last_three() {
    let mut buffer = BoundedBuffer::new(BufferLimits::new(3, usize::MAX));
    for event in ["a", "b", "c", "d", "e"] {
        buffer.push(event);
    }
    let mut drained = Vec::new();
    buffer.flush(|event| drained.push(event));
    assert_eq!(drained, vec!["c", "d", "e"]);
}

#[test]
fn pending_events_never_reach_transport_before_grant() {
    let (gate, delivered) = gate_with_log(BufferLimits::default());
    for event in 0..5 {
        assert_eq!(gate.dispatch(event), DispatchOutcome::Buffered);
    }
    assert!(delivered.borrow().is_empty());
    assert_eq!(gate.pending_len(), 5);
}

#[test]
fn grant_delivers_backlog_once_in_order() {
    let (gate, delivered) = gate_with_log(BufferLimits::default());
    for event in [10, 20, 30] {
        gate.dispatch(event);
    }
    assert!(gate.grant(ConsentSource::User));
    assert!(!gate.grant(ConsentSource::User));
    assert_eq!(*delivered.borrow(), vec![10, 20, 30]);
    assert_eq!(gate.pending_len(), 0);
}

#[test]
fn revoke_then_enqueue_buffers_without_redelivery() {
    let (gate, delivered) = gate_with_log(BufferLimits::default());
    gate.dispatch(1);
    gate.grant(ConsentSource::Host);
    gate.dispatch(2);
    assert!(gate.revoke());
    assert_eq!(gate.state(), ConsentState::Pending);

    assert_eq!(gate.dispatch(3), DispatchOutcome::Buffered);
    assert_eq!(*delivered.borrow(), vec![1, 2]);

    gate.grant(ConsentSource::Host);
    assert_eq!(*delivered.borrow(), vec![1, 2, 3]);
}

#[test]
fn evicted_events_are_dropped_not_retried() {
    let (gate, delivered) = gate_with_log(BufferLimits::new(2, usize::MAX));
    for event in 0..4 {
        gate.dispatch(event);
    }
    gate.grant(ConsentSource::Config);
    assert_eq!(*delivered.borrow(), vec![2, 3]);
}

#[derive(Debug, Clone)]
enum Op {
    Event,
    Grant,
    Revoke,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => Just(Op::Event),
        1 => Just(Op::Grant),
        1 => Just(Op::Revoke),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// With an unbounded buffer, every event is delivered exactly once, in
    /// enqueue order, and never while consent is pending.
    #[test]
    fn exactly_once_in_order(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let (gate, delivered) = gate_with_log(BufferLimits::unbounded());
        let mut next = 0u32;
        for op in &ops {
            match op {
                Op::Event => {
                    let before = delivered.borrow().len();
                    gate.dispatch(next);
                    let after = delivered.borrow().len();
                    if gate.is_granted() {
                        prop_assert_eq!(after, before + 1);
                    } else {
                        prop_assert_eq!(after, before);
                    }
                    next += 1;
                }
                Op::Grant => {
                    gate.grant(ConsentSource::User);
                }
                Op::Revoke => {
                    gate.revoke();
                }
            }
        }
        gate.grant(ConsentSource::User);

        let expected: Vec<u32> = (0..next).collect();
        prop_assert_eq!(delivered.borrow().clone(), expected);
        prop_assert_eq!(gate.pending_len(), 0);
    }
}
