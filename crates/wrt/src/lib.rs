#![forbid(unsafe_code)]

//! Embed runtime coordination layer.
//!
//! Several embeds can share one host page. This crate wires the pieces each
//! of them needs:
//!
//! - [`codec`]: compact, URL-safe plan tokens
//! - [`router`]: address-bar routing with page-wide ownership arbitration
//! - [`events`]: bounded analytics buffering behind a consent gate
//! - [`guard`]: Trusted Types probing and markup sanitizing
//! - [`net`]: plan-store client with retries and abort signals
//!
//! [`EmbedRuntime::mount`] puts them together for one embed.
//!
//! # Example
//!
//! ```
//! use wrt::{EmbedRuntime, RuntimeConfig};
//! use wrt::core::{MemoryHost, OwnershipRegistry};
//! use wrt::guard::StaticTrustedTypes;
//!
//! let host = MemoryHost::at("https://shop.example/events").unwrap();
//! let runtime = EmbedRuntime::mount(
//!     host,
//!     &StaticTrustedTypes::Absent,
//!     OwnershipRegistry::new(),
//!     RuntimeConfig::for_embed("lineup"),
//!     |_event| {},
//! )
//! .unwrap();
//! assert_eq!(runtime.render_markup("<b>hi</b><script>x</script>").unwrap().as_str(), "<b>hi</b>");
//! ```

pub mod config;
pub mod logging;
pub mod runtime;

pub use config::{ConfigError, NetworkConfig, RuntimeConfig};
pub use runtime::{AnalyticsEvent, EmbedRuntime, MountError};

pub use wrt_codec as codec;
pub use wrt_core as core;
pub use wrt_events as events;
pub use wrt_guard as guard;
pub use wrt_net as net;
pub use wrt_router as router;
