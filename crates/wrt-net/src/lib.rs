#![forbid(unsafe_code)]

//! Network plumbing for the wrt embed runtime.
//!
//! Host-driven and single-threaded: a [`Transport`] sends one request, the
//! retry loop in [`fetch_with_retry`] decides whether to try again, and
//! [`AbortSignal`]s (caller-owned plus a per-call timeout) stop everything.
//!
//! [`PlanStoreClient`] uses these to talk to the remote plan store.

mod abort;
mod client;
mod fetch;
mod retry;
mod transport;

pub use abort::{AbortController, AbortReason, AbortSignal};
pub use client::{DEFAULT_TIMEOUT, PlanReference, PlanStoreClient};
pub use fetch::fetch_with_retry;
pub use retry::{BackoffStrategy, DEFAULT_RETRIABLE_STATUSES, RetryPolicy};
#[cfg(all(feature = "reqwest", not(target_arch = "wasm32")))]
pub use transport::ReqwestTransport;
pub use transport::{Method, NetError, Request, Response, Transport};
