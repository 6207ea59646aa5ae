#![forbid(unsafe_code)]

//! FIFO buffer with dual eviction limits.
//!
//! # Design
//!
//! [`BoundedBuffer<T>`] keeps a `VecDeque` of [`BufferedItem`]s plus a running
//! byte total. After every push it evicts from the head while either limit is
//! exceeded. Sizes come from an injectable sizer; the default serialises the
//! payload as JSON and counts bytes.
//!
//! # Invariants
//!
//! 1. After `push` returns, `len() <= max_items` and `total_bytes() <= max_bytes`.
//! 2. Surviving items keep their relative push order.
//! 3. `push` never fails and never panics; a payload that cannot be sized
//!    counts as zero bytes.
//! 4. `flush` removes each item before handing it to the callback.
//!
//! # Failure Modes
//!
//! - **Single oversize payload**: an item larger than `max_bytes` evicts
//!   everything ahead of it and then itself.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

/// Eviction limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferLimits {
    /// Maximum number of queued items.
    pub max_items: usize,
    /// Maximum cumulative estimated size in bytes.
    pub max_bytes: usize,
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            max_items: 100,
            max_bytes: 64 * 1024,
        }
    }
}

impl BufferLimits {
    #[must_use]
    pub const fn new(max_items: usize, max_bytes: usize) -> Self {
        Self {
            max_items,
            max_bytes,
        }
    }

    /// No practical limit.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            max_items: usize::MAX,
            max_bytes: usize::MAX,
        }
    }
}

/// A queued payload with its estimated size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedItem<T> {
    pub payload: T,
    pub byte_size: usize,
}

type Sizer<T> = Box<dyn Fn(&T) -> usize>;
type EvictHook<T> = Box<dyn FnMut(&BufferedItem<T>)>;

struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Length of `payload` serialised as JSON, or `0` if it cannot be serialised.
#[must_use]
pub fn json_size_estimate<T: Serialize + ?Sized>(payload: &T) -> usize {
    let mut counter = ByteCounter(0);
    match serde_json::to_writer(&mut counter, payload) {
        Ok(()) => counter.0,
        Err(err) => {
            tracing::debug!(error = %err, "payload not serialisable; sizing as zero");
            0
        }
    }
}

/// FIFO queue with item-count and byte-size limits.
pub struct BoundedBuffer<T> {
    items: VecDeque<BufferedItem<T>>,
    limits: BufferLimits,
    total_bytes: usize,
    evicted: u64,
    sizer: Sizer<T>,
    on_evict: Option<EvictHook<T>>,
}

impl<T> fmt::Debug for BoundedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedBuffer")
            .field("len", &self.items.len())
            .field("total_bytes", &self.total_bytes)
            .field("limits", &self.limits)
            .field("evicted", &self.evicted)
            .finish()
    }
}

impl<T: Serialize + 'static> BoundedBuffer<T> {
    /// Create a buffer sized by [`json_size_estimate`].
    #[must_use]
    pub fn new(limits: BufferLimits) -> Self {
        Self::with_sizer(limits, json_size_estimate::<T>)
    }
}

impl<T> BoundedBuffer<T> {
    /// Create a buffer with a custom sizing function.
    #[must_use]
    pub fn with_sizer(limits: BufferLimits, sizer: impl Fn(&T) -> usize + 'static) -> Self {
        Self {
            items: VecDeque::new(),
            limits,
            total_bytes: 0,
            evicted: 0,
            sizer: Box::new(sizer),
            on_evict: None,
        }
    }

    /// Install a hook called once per evicted item (telemetry on data loss).
    #[must_use]
    pub fn on_evict(mut self, hook: impl FnMut(&BufferedItem<T>) + 'static) -> Self {
        self.on_evict = Some(Box::new(hook));
        self
    }

    /// Append `payload`, then evict from the head until both limits hold.
    ///
    /// Returns the number of items evicted by this push.
    pub fn push(&mut self, payload: T) -> usize {
        let byte_size = (self.sizer)(&payload);
        self.total_bytes = self.total_bytes.saturating_add(byte_size);
        self.items.push_back(BufferedItem { payload, byte_size });

        let mut evicted = 0;
        while self.over_limit() {
            let Some(item) = self.items.pop_front() else {
                break;
            };
            self.total_bytes = self.total_bytes.saturating_sub(item.byte_size);
            self.evicted += 1;
            evicted += 1;
            if let Some(hook) = self.on_evict.as_mut() {
                hook(&item);
            }
        }
        if evicted > 0 {
            tracing::debug!(
                evicted,
                remaining = self.items.len(),
                bytes = self.total_bytes,
                "buffer limit reached; oldest entries dropped"
            );
        }
        evicted
    }

    fn over_limit(&self) -> bool {
        self.items.len() > self.limits.max_items || self.total_bytes > self.limits.max_bytes
    }

    /// Remove and return the head item.
    pub fn pop_front(&mut self) -> Option<BufferedItem<T>> {
        let item = self.items.pop_front()?;
        self.total_bytes = self.total_bytes.saturating_sub(item.byte_size);
        Some(item)
    }

    /// Drain the queue head-to-tail, one callback per item.
    ///
    /// Returns the number of items handed to `callback`.
    pub fn flush(&mut self, mut callback: impl FnMut(T)) -> usize {
        let mut flushed = 0;
        while let Some(item) = self.pop_front() {
            callback(item.payload);
            flushed += 1;
        }
        flushed
    }

    /// Discard every entry without invoking any callback.
    ///
    /// Returns how many entries were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.items.len();
        self.items.clear();
        self.total_bytes = 0;
        dropped
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of the estimated sizes of queued items.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Items evicted over the buffer's lifetime.
    #[must_use]
    pub fn evicted_count(&self) -> u64 {
        self.evicted
    }

    #[must_use]
    pub fn limits(&self) -> BufferLimits {
        self.limits
    }

    /// Queued items, head first.
    pub fn iter(&self) -> impl Iterator<Item = &BufferedItem<T>> + '_ {
        self.items.iter()
    }
}

/// Drain a shared buffer without holding its borrow across callbacks.
///
/// Only the items queued when the drain starts are delivered; anything the
/// callback pushes stays queued for the next flush, so a callback that keeps
/// pushing cannot make the drain run forever.
pub fn flush_shared<T>(buffer: &RefCell<BoundedBuffer<T>>, mut callback: impl FnMut(T)) -> usize {
    let queued = buffer.borrow().len();
    let mut flushed = 0;
    for _ in 0..queued {
        let next = buffer.borrow_mut().pop_front();
        let Some(item) = next else {
            break;
        };
        callback(item.payload);
        flushed += 1;
    }
    flushed
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::rc::Rc;

    fn payloads<T: Clone>(buffer: &BoundedBuffer<T>) -> Vec<T> {
        buffer.iter().map(|item| item.payload.clone()).collect()
    }

    #[test]
    fn max_items_keeps_newest_in_order() {
        let mut buffer = BoundedBuffer::new(BufferLimits::new(3, usize::MAX));
        for i in 1..=5 {
            buffer.push(i);
        }
        assert_eq!(payloads(&buffer), vec![3, 4, 5]);
        assert_eq!(buffer.evicted_count(), 2);
    }

    #[test]
    fn max_bytes_evicts_oldest() {
        let mut buffer = BoundedBuffer::with_sizer(BufferLimits::new(100, 10), |s: &String| s.len());
        buffer.push("aaaa".to_string());
        buffer.push("bbbb".to_string());
        assert_eq!(buffer.push("cccc".to_string()), 1);
        assert_eq!(payloads(&buffer), vec!["bbbb", "cccc"]);
        assert_eq!(buffer.total_bytes(), 8);
    }

    #[test]
    fn oversize_item_evicts_itself() {
        let mut buffer = BoundedBuffer::with_sizer(BufferLimits::new(10, 4), |s: &&str| s.len());
        buffer.push("ab");
        assert_eq!(buffer.push("too large"), 2);
        assert!(buffer.is_empty());
        assert_eq!(buffer.total_bytes(), 0);
    }

    #[test]
    fn evict_hook_sees_dropped_items() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut buffer = BoundedBuffer::new(BufferLimits::new(2, usize::MAX))
            .on_evict(move |item: &BufferedItem<u8>| sink.borrow_mut().push(item.payload));
        for i in 0..4u8 {
            buffer.push(i);
        }
        assert_eq!(*seen.borrow(), vec![0, 1]);
    }

    #[test]
    fn default_sizer_uses_json_length() {
        let mut buffer = BoundedBuffer::new(BufferLimits::default());
        buffer.push(serde_json::json!({"a": 1}));
        assert_eq!(buffer.total_bytes(), r#"{"a":1}"#.len());
    }

    #[test]
    fn unserialisable_payload_sizes_as_zero() {
        use std::collections::HashMap;
        // Non-string map keys are rejected by serde_json.
        let mut map = HashMap::new();
        map.insert(vec![1u8], 1u8);
        assert_eq!(json_size_estimate(&map), 0);

        let mut buffer = BoundedBuffer::new(BufferLimits::default());
        buffer.push(map);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.total_bytes(), 0);
    }

    #[test]
    fn flush_drains_in_order() {
        let mut buffer = BoundedBuffer::new(BufferLimits::default());
        for i in 0..4 {
            buffer.push(i);
        }
        let mut out = Vec::new();
        assert_eq!(buffer.flush(|v| out.push(v)), 4);
        assert_eq!(out, vec![0, 1, 2, 3]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.total_bytes(), 0);
    }

    #[test]
    fn huge_sizes_saturate_and_drain_to_zero() {
        let mut buffer =
            BoundedBuffer::with_sizer(BufferLimits::unbounded(), |_: &u8| usize::MAX / 2 + 1);
        buffer.push(1);
        buffer.push(2);
        buffer.push(3);
        assert_eq!(buffer.total_bytes(), usize::MAX);
        let mut out = Vec::new();
        assert_eq!(buffer.flush(|v| out.push(v)), 3);
        assert_eq!(out, vec![1, 2, 3]);
        assert_eq!(buffer.total_bytes(), 0);
    }

    #[test]
    fn clear_skips_callbacks() {
        let evictions = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&evictions);
        let mut buffer = BoundedBuffer::new(BufferLimits::default())
            .on_evict(move |_: &BufferedItem<i32>| *counter.borrow_mut() += 1);
        buffer.push(1);
        buffer.push(2);
        assert_eq!(buffer.clear(), 2);
        assert!(buffer.is_empty());
        assert_eq!(*evictions.borrow(), 0);
    }

    #[test]
    fn shared_flush_leaves_reentrant_pushes_for_next_round() {
        let buffer = Rc::new(RefCell::new(BoundedBuffer::new(BufferLimits::default())));
        buffer.borrow_mut().push(1);
        buffer.borrow_mut().push(2);

        let mut seen = Vec::new();
        let reentrant = Rc::clone(&buffer);
        let flushed = flush_shared(&buffer, |v| {
            seen.push(v);
            reentrant.borrow_mut().push(v * 10);
        });

        assert_eq!(flushed, 2);
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(payloads(&buffer.borrow()), vec![10, 20]);
    }
}
