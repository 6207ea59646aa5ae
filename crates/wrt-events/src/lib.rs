#![forbid(unsafe_code)]

//! Event plumbing for analytics emission points.
//!
//! # Key Components
//!
//! - [`BoundedBuffer`] - FIFO queue with item-count and byte-size limits;
//!   the oldest entries are evicted first
//! - [`GatedDispatcher`] - transport wrapper that buffers while a gate is
//!   closed or the dispatcher is paused, and flushes in order once open
//! - [`ConsentGate`] - pending/granted state machine on top of the
//!   dispatcher, with change notifications
//!
//! # Ordering
//!
//! Buffered payloads reach the transport in enqueue order, and each payload
//! reaches it at most once. Evicted payloads are dropped, never retried.

pub mod bounded_buffer;
pub mod consent;
pub mod dispatcher;

pub use bounded_buffer::{BoundedBuffer, BufferLimits, BufferedItem, json_size_estimate};
pub use consent::{ConsentChange, ConsentGate, ConsentSource, ConsentState};
pub use dispatcher::{DispatchOutcome, GatedDispatcher};
