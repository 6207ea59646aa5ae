#![forbid(unsafe_code)]

//! Core building blocks shared by every wrt crate.
//!
//! # Key Components
//!
//! - [`OwnershipRegistry`] - page-scoped claim/release arbitration for
//!   capabilities only one embed instance may hold at a time
//! - [`EventBus`] - typed publish/subscribe keyed by channel name
//! - [`ListenerRegistry`] - bookkeeping for host event listeners so teardown
//!   removes exactly what was registered
//! - [`BrowserHost`] - the boundary between the runtime and the page
//!   (address bar, history, listeners)
//!
//! # Execution model
//!
//! Everything here is single-threaded and host-driven. Shared state lives in
//! `Rc<RefCell<..>>`; the embedding environment owns the event loop and calls
//! into the runtime when DOM events fire. Nothing blocks.

pub mod event_bus;
pub mod host;
pub mod listeners;
#[cfg(any(test, feature = "test-helpers"))]
pub mod memory_host;
pub mod ownership;

pub use event_bus::{EventBus, ListenerId};
pub use host::{BrowserHost, HostError, HostListenerId};
pub use listeners::{ListenerKind, ListenerRegistry, ListenerSpec, ListenerTarget};
#[cfg(any(test, feature = "test-helpers"))]
pub use memory_host::MemoryHost;
pub use ownership::{OwnershipKey, OwnershipRegistry};
pub use url::Url;
