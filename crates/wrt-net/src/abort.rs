#![forbid(unsafe_code)]

//! Abort signals for network calls.
//!
//! [`AbortController`] / [`AbortSignal`] mirror the browser pair of the same
//! name for a single-threaded runtime: the controller flips a shared flag,
//! signals observe it. Two derived signals complete the set:
//!
//! - [`AbortSignal::timeout`] fires once a deadline passes,
//! - [`AbortSignal::any`] fires when any of its inputs fires.
//!
//! Signals are polled; nothing here blocks or spawns.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use wrt_net::{AbortController, AbortReason, AbortSignal};
//!
//! let controller = AbortController::new();
//! let signal = AbortSignal::any([controller.signal(), AbortSignal::timeout(Duration::from_secs(30))]);
//! assert!(!signal.is_aborted());
//!
//! controller.abort();
//! assert_eq!(signal.reason(), Some(AbortReason::Caller));
//! ```

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use web_time::{Duration, Instant};

/// Why a signal fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbortReason {
    /// [`AbortController::abort`] was called.
    Caller,
    /// A timeout signal's deadline passed.
    Timeout,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Caller => f.write_str("aborted by caller"),
            Self::Timeout => f.write_str("timed out"),
        }
    }
}

/// The control handle that fires its signals.
///
/// Dropping the controller does not abort.
#[derive(Debug, Default)]
pub struct AbortController {
    flag: Rc<Cell<bool>>,
}

impl AbortController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal observing this controller.
    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            inner: Signal::Manual(Rc::clone(&self.flag)),
        }
    }

    /// Fire. Idempotent.
    pub fn abort(&self) {
        self.flag.set(true);
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.flag.get()
    }
}

#[derive(Clone)]
enum Signal {
    Never,
    Manual(Rc<Cell<bool>>),
    Deadline(Instant),
    Any(Rc<[AbortSignal]>),
}

/// A cloneable, pollable abort signal.
#[derive(Clone)]
pub struct AbortSignal {
    inner: Signal,
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::never()
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal")
            .field("reason", &self.reason())
            .field("remaining", &self.remaining())
            .finish()
    }
}

impl AbortSignal {
    /// A signal that never fires.
    #[must_use]
    pub const fn never() -> Self {
        Self {
            inner: Signal::Never,
        }
    }

    /// Fires `duration` from now.
    #[must_use]
    pub fn timeout(duration: Duration) -> Self {
        let deadline = Instant::now()
            .checked_add(duration)
            .unwrap_or_else(Instant::now);
        Self {
            inner: Signal::Deadline(deadline),
        }
    }

    /// Fires when any of `signals` fires.
    #[must_use]
    pub fn any(signals: impl IntoIterator<Item = AbortSignal>) -> Self {
        let signals: Rc<[AbortSignal]> = signals.into_iter().collect();
        Self {
            inner: Signal::Any(signals),
        }
    }

    /// Why the signal fired, or `None` if it has not.
    ///
    /// For composites, a caller abort wins over a timeout.
    #[must_use]
    pub fn reason(&self) -> Option<AbortReason> {
        match &self.inner {
            Signal::Never => None,
            Signal::Manual(flag) => flag.get().then_some(AbortReason::Caller),
            Signal::Deadline(deadline) => {
                (Instant::now() >= *deadline).then_some(AbortReason::Timeout)
            }
            Signal::Any(signals) => {
                let mut fired = None;
                for reason in signals.iter().filter_map(Self::reason) {
                    if reason == AbortReason::Caller {
                        return Some(reason);
                    }
                    fired = Some(reason);
                }
                fired
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.reason().is_some()
    }

    /// Time left before the earliest deadline, if any deadline exists.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        match &self.inner {
            Signal::Never | Signal::Manual(_) => None,
            Signal::Deadline(deadline) => {
                Some(deadline.saturating_duration_since(Instant::now()))
            }
            Signal::Any(signals) => signals.iter().filter_map(Self::remaining).min(),
        }
    }
}
