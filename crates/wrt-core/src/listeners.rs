#![forbid(unsafe_code)]

//! Instance-owned bookkeeping for host event listeners.
//!
//! Every `(target, type, listener)` triple an instance registers is recorded
//! here. Teardown iterates the record and removes exactly those listeners,
//! which makes `destroy()` safe to call any number of times.

use std::fmt;

use crate::host::{BrowserHost, HostListenerId};

/// Where a listener is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerTarget {
    /// `window`
    Window,
    /// `document`
    Document,
    /// The embed's own container element.
    Container,
}

/// DOM event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    PopState,
    HashChange,
    Click,
}

impl ListenerKind {
    /// DOM event type string.
    #[must_use]
    pub const fn event_type(self) -> &'static str {
        match self {
            Self::PopState => "popstate",
            Self::HashChange => "hashchange",
            Self::Click => "click",
        }
    }
}

/// A listener registration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerSpec {
    pub target: ListenerTarget,
    pub kind: ListenerKind,
    /// Register in the capture phase.
    pub capture: bool,
}

impl ListenerSpec {
    #[must_use]
    pub const fn new(target: ListenerTarget, kind: ListenerKind) -> Self {
        Self {
            target,
            kind,
            capture: false,
        }
    }

    #[must_use]
    pub const fn capturing(mut self) -> Self {
        self.capture = true;
        self
    }
}

impl fmt::Display for ListenerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.target, self.kind.event_type())?;
        if self.capture {
            f.write_str(" (capture)")?;
        }
        Ok(())
    }
}

/// Record of the listeners one instance registered with its host.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    entries: Vec<(ListenerSpec, HostListenerId)>,
}

impl ListenerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `spec` with `host` and remember the returned id.
    pub fn register<H: BrowserHost + ?Sized>(&mut self, host: &H, spec: ListenerSpec) {
        let id = host.add_listener(spec);
        tracing::trace!(listener = %spec, id = id.0, "listener registered");
        self.entries.push((spec, id));
    }

    /// Remove every recorded listener from `host`.
    ///
    /// Returns how many were removed. A second call removes nothing.
    pub fn remove_all<H: BrowserHost + ?Sized>(&mut self, host: &H) -> usize {
        let removed = self.entries.len();
        for (spec, id) in self.entries.drain(..) {
            host.remove_listener(id);
            tracing::trace!(listener = %spec, id = id.0, "listener removed");
        }
        removed
    }

    /// Whether a listener matching `kind` is registered.
    #[must_use]
    pub fn has(&self, kind: ListenerKind) -> bool {
        self.entries.iter().any(|(spec, _)| spec.kind == kind)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered specs in registration order.
    pub fn specs(&self) -> impl Iterator<Item = &ListenerSpec> + '_ {
        self.entries.iter().map(|(spec, _)| spec)
    }
}
