#![forbid(unsafe_code)]

//! Browser adapter for the wrt embed runtime.
//!
//! [`EmbedHandle`] is the `wasm-bindgen` surface: it mounts an
//! [`EmbedRuntime`](wrt::EmbedRuntime) against `window`, forwards
//! `popstate`, `hashchange` and capture-phase clicks into the router, and
//! inserts guarded markup into the embed's container. The page-wide
//! ownership registry is shared by every handle on the page.
//!
//! On native targets only the JS-facing shapes in [`bridge`] are built.

pub mod bridge;

#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(target_arch = "wasm32")]
pub use wasm::{EmbedHandle, WindowHost};
