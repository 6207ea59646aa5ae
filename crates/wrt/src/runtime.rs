#![forbid(unsafe_code)]

//! One mounted embed: guard, router, and consent-gated analytics.

use std::fmt;

use wrt_core::{BrowserHost, HostError, ListenerId, OwnershipRegistry};
use wrt_events::{
    BoundedBuffer, ConsentChange, ConsentGate, ConsentSource, ConsentState, DispatchOutcome,
};
use wrt_guard::{GuardError, GuardState, GuardedMarkup, TrustedTypesHost};
use wrt_router::HistoryRouter;

use crate::config::RuntimeConfig;

/// Analytics payloads are opaque JSON.
pub type AnalyticsEvent = serde_json::Value;

/// Why [`EmbedRuntime::mount`] refused to start.
#[derive(Debug, thiserror::Error)]
pub enum MountError {
    /// Trusted Types are enforced and no policy could be created.
    #[error("trusted types enforced and no policy available; embed not rendered")]
    TrustedContentEnforced,
    #[error("invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),
    #[error(transparent)]
    Host(#[from] HostError),
}

/// A mounted embed.
pub struct EmbedRuntime<H: BrowserHost> {
    config: RuntimeConfig,
    guard: GuardState,
    router: HistoryRouter<H>,
    consent: ConsentGate<AnalyticsEvent>,
}

impl<H: BrowserHost> fmt::Debug for EmbedRuntime<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbedRuntime")
            .field("embed_id", &self.config.router.embed_id)
            .field("guard", &self.guard)
            .field("mode", &self.router.mode())
            .field("consent", &self.consent.state())
            .finish_non_exhaustive()
    }
}

impl<H: BrowserHost> EmbedRuntime<H> {
    /// Mount an embed.
    ///
    /// The trusted-content probe runs before anything else. When it says the
    /// page enforces Trusted Types and no policy is available, nothing is
    /// claimed, registered, or rendered.
    pub fn mount<T: TrustedTypesHost + ?Sized>(
        host: H,
        trusted_types: &T,
        registry: OwnershipRegistry,
        config: RuntimeConfig,
        analytics: impl Fn(AnalyticsEvent) + 'static,
    ) -> Result<Self, MountError> {
        let guard = wrt_guard::probe(trusted_types, &config.trusted_policy_name);
        if wrt_guard::should_abort(&guard) {
            tracing::error!(
                embed = %config.router.embed_id,
                policy = %config.trusted_policy_name,
                "mount aborted: trusted content cannot be rendered"
            );
            return Err(MountError::TrustedContentEnforced);
        }

        let problems = config.validate();
        if !problems.is_empty() {
            return Err(MountError::InvalidConfig(problems));
        }

        let router = HistoryRouter::new(host, registry, config.router.clone())?;
        let consent = ConsentGate::with_buffer(
            BoundedBuffer::new(config.buffer),
            analytics,
            config.consent,
        );

        tracing::info!(
            embed = %config.router.embed_id,
            mode = %router.mode(),
            takeover = %router.takeover(),
            trusted = guard.policy.is_some(),
            consent = ?consent.state(),
            "embed mounted"
        );

        Ok(Self {
            config,
            guard,
            router,
            consent,
        })
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[must_use]
    pub fn guard(&self) -> &GuardState {
        &self.guard
    }

    #[must_use]
    pub fn router(&self) -> &HistoryRouter<H> {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut HistoryRouter<H> {
        &mut self.router
    }

    /// Clean `html` and wrap it through the trusted-types policy when present.
    pub fn render_markup(&self, html: &str) -> Result<GuardedMarkup, GuardError> {
        wrt_guard::sanitize_with_guard(html, &self.guard)
    }

    /// Escape plain text for insertion as HTML.
    #[must_use]
    pub fn render_text(&self, text: &str) -> String {
        wrt_guard::sanitize_text(text)
    }

    /// Route an analytics payload through the consent gate.
    ///
    /// `None` after [`destroy`](Self::destroy): the payload is dropped.
    pub fn track(&self, event: AnalyticsEvent) -> Option<DispatchOutcome> {
        if self.router.is_destroyed() {
            tracing::debug!(embed = %self.config.router.embed_id, "analytics after destroy dropped");
            return None;
        }
        Some(self.consent.dispatch(event))
    }

    #[must_use]
    pub fn consent(&self) -> ConsentState {
        self.consent.state()
    }

    /// Grant consent and flush the analytics backlog in order.
    pub fn grant_consent(&self, source: ConsentSource) -> bool {
        self.consent.grant(source)
    }

    /// Stop delivering future analytics. Already-sent payloads stay sent.
    pub fn revoke_consent(&self) -> bool {
        self.consent.revoke()
    }

    pub fn on_consent_change(&self, callback: impl Fn(&ConsentChange) + 'static) -> ListenerId {
        self.consent.subscribe(callback)
    }

    pub fn off_consent_change(&self, id: ListenerId) -> bool {
        self.consent.unsubscribe(id)
    }

    /// Payloads waiting for consent.
    #[must_use]
    pub fn pending_analytics(&self) -> usize {
        self.consent.pending_len()
    }

    /// Tear down the router and discard the analytics backlog.
    ///
    /// Returns `true` the first time only.
    pub fn destroy(&mut self) -> bool {
        if !self.router.destroy() {
            return false;
        }
        let discarded = self.consent.clear();
        tracing::info!(
            embed = %self.config.router.embed_id,
            discarded,
            "embed destroyed"
        );
        true
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.router.is_destroyed()
    }
}
