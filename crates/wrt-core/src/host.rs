#![forbid(unsafe_code)]

//! Host boundary: the page capabilities the runtime is allowed to touch.
//!
//! The runtime never calls browser APIs directly. All address-bar reads,
//! history writes, and listener registration flow through [`BrowserHost`].
//! The `wasm32` adapter in `wrt-web` binds it to `window`; tests use
//! [`MemoryHost`](crate::MemoryHost).
//!
//! Methods take `&self`: browser objects are shared handles, and hosts use
//! interior mutability for their own bookkeeping.

use std::rc::Rc;

use url::Url;

use crate::listeners::ListenerSpec;

/// Host-assigned identifier of a registered event listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostListenerId(pub u64);

/// Failure reported by the host for a page operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// `pushState`/`replaceState` threw (CSP, sandboxed iframe, quota).
    #[error("history write rejected: {0}")]
    HistoryRejected(String),
    /// A hard navigation could not be started.
    #[error("navigation rejected: {0}")]
    NavigationRejected(String),
    /// The current location could not be read or parsed.
    #[error("invalid location: {0}")]
    InvalidLocation(String),
}

/// Page capabilities used by the history router.
pub trait BrowserHost {
    /// The current absolute address-bar URL.
    fn location(&self) -> Result<Url, HostError>;

    /// `history.pushState(null, "", url)`.
    fn push_state(&self, url: &Url) -> Result<(), HostError>;

    /// `history.replaceState(null, "", url)`.
    fn replace_state(&self, url: &Url) -> Result<(), HostError>;

    /// `location.assign(url)`: a full page navigation.
    fn assign(&self, url: &Url) -> Result<(), HostError>;

    /// Register an event listener described by `spec`.
    ///
    /// The host is responsible for forwarding matching DOM events back into
    /// the runtime.
    fn add_listener(&self, spec: ListenerSpec) -> HostListenerId;

    /// Remove a listener previously returned by [`add_listener`](Self::add_listener).
    fn remove_listener(&self, id: HostListenerId);
}

impl<T: BrowserHost + ?Sized> BrowserHost for Rc<T> {
    fn location(&self) -> Result<Url, HostError> {
        (**self).location()
    }

    fn push_state(&self, url: &Url) -> Result<(), HostError> {
        (**self).push_state(url)
    }

    fn replace_state(&self, url: &Url) -> Result<(), HostError> {
        (**self).replace_state(url)
    }

    fn assign(&self, url: &Url) -> Result<(), HostError> {
        (**self).assign(url)
    }

    fn add_listener(&self, spec: ListenerSpec) -> HostListenerId {
        (**self).add_listener(spec)
    }

    fn remove_listener(&self, id: HostListenerId) {
        (**self).remove_listener(id);
    }
}

impl<T: BrowserHost + ?Sized> BrowserHost for &T {
    fn location(&self) -> Result<Url, HostError> {
        (**self).location()
    }

    fn push_state(&self, url: &Url) -> Result<(), HostError> {
        (**self).push_state(url)
    }

    fn replace_state(&self, url: &Url) -> Result<(), HostError> {
        (**self).replace_state(url)
    }

    fn assign(&self, url: &Url) -> Result<(), HostError> {
        (**self).assign(url)
    }

    fn add_listener(&self, spec: ListenerSpec) -> HostListenerId {
        (**self).add_listener(spec)
    }

    fn remove_listener(&self, id: HostListenerId) {
        (**self).remove_listener(id);
    }
}
