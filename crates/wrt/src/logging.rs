#![forbid(unsafe_code)]

//! Subscriber setup for native hosts and tests.
//!
//! Library code only emits `tracing` events. Hosts that want them printed
//! call [`init_tracing`] once at startup (feature `tracing-subscriber`).

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "warn,wrt=info";

/// Install a global `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// [`DEFAULT_FILTER`].
///
/// Fails if a global subscriber is already set.
#[cfg(feature = "tracing-subscriber")]
pub fn init_tracing() -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
}
