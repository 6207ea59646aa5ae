#![forbid(unsafe_code)]

//! Trusted content guard.
//!
//! Runs once at startup and decides whether the embed may inject markup.
//! Pages that enforce Trusted Types only accept HTML produced by a policy;
//! the guard tries to create one and records what happened:
//!
//! | Factory | Policy creation | [`GuardState`] | Abort |
//! |---------|-----------------|----------------|-------|
//! | absent | n/a | `supported = false` | no |
//! | present | ok | `supported = true`, policy set | no |
//! | present | fails | `enforced = true`, no policy | yes |
//!
//! Markup always goes through the baseline sanitizer first
//! ([`sanitize_markup`]); a policy, when present, wraps the cleaned string.

use std::fmt;
use std::rc::Rc;

/// Policy name requested from the host.
pub const DEFAULT_POLICY_NAME: &str = "wrt-embed";

/// HTML accepted by a trusted-types policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedHtml(String);

impl TrustedHtml {
    /// Wrap `html` as policy output. Only policies should call this.
    #[must_use]
    pub fn new(html: impl Into<String>) -> Self {
        Self(html.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

/// Failure reported by the host's policy machinery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// `trustedTypes.createPolicy` threw (CSP `trusted-types` allow-list).
    #[error("policy {name:?} rejected: {reason}")]
    Rejected { name: String, reason: String },
    /// `policy.createHTML` threw.
    #[error("policy {name:?} refused markup: {reason}")]
    Refused { name: String, reason: String },
}

/// Errors from [`sanitize_with_guard`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    /// Trusted Types are enforced and no policy exists; nothing may be
    /// injected.
    #[error("trusted types enforced without a usable policy")]
    Enforced,
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// A created trusted-types policy.
pub trait TrustedPolicy {
    fn name(&self) -> &str;

    /// `policy.createHTML(input)`.
    fn create_html(&self, input: &str) -> Result<TrustedHtml, PolicyError>;
}

/// Access to the page's policy factory (`window.trustedTypes`).
pub trait TrustedTypesHost {
    /// Whether a factory exists at all.
    fn has_policy_factory(&self) -> bool;

    /// `trustedTypes.createPolicy(name, ...)`.
    fn create_policy(&self, name: &str) -> Result<Rc<dyn TrustedPolicy>, PolicyError>;
}

/// Policy that passes already-sanitized markup through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassthroughPolicy {
    name: String,
}

impl PassthroughPolicy {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl TrustedPolicy for PassthroughPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_html(&self, input: &str) -> Result<TrustedHtml, PolicyError> {
        Ok(TrustedHtml::new(input))
    }
}

/// Fixed-behaviour host for native runs and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaticTrustedTypes {
    /// No factory on the page.
    Absent,
    /// Factory creates [`PassthroughPolicy`] instances.
    Permissive,
    /// Factory exists but refuses every policy name.
    Rejecting(String),
}

impl TrustedTypesHost for StaticTrustedTypes {
    fn has_policy_factory(&self) -> bool {
        !matches!(self, Self::Absent)
    }

    fn create_policy(&self, name: &str) -> Result<Rc<dyn TrustedPolicy>, PolicyError> {
        match self {
            Self::Permissive => Ok(Rc::new(PassthroughPolicy::new(name))),
            Self::Rejecting(reason) => Err(PolicyError::Rejected {
                name: name.to_owned(),
                reason: reason.clone(),
            }),
            Self::Absent => Err(PolicyError::Rejected {
                name: name.to_owned(),
                reason: "no policy factory".to_owned(),
            }),
        }
    }
}

/// Result of the startup probe.
#[derive(Clone, Default)]
pub struct GuardState {
    /// A policy factory exists.
    pub supported: bool,
    /// The page enforces Trusted Types and policy creation failed.
    pub enforced: bool,
    pub policy: Option<Rc<dyn TrustedPolicy>>,
}

impl fmt::Debug for GuardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardState")
            .field("supported", &self.supported)
            .field("enforced", &self.enforced)
            .field("policy", &self.policy.as_ref().map(|p| p.name().to_owned()))
            .finish()
    }
}

/// Probe `host` for a policy factory and try to create `policy_name`.
pub fn probe<T: TrustedTypesHost + ?Sized>(host: &T, policy_name: &str) -> GuardState {
    if !host.has_policy_factory() {
        tracing::debug!("no trusted types factory; using baseline sanitizer only");
        return GuardState::default();
    }
    match host.create_policy(policy_name) {
        Ok(policy) => {
            tracing::debug!(policy = policy_name, "trusted types policy created");
            GuardState {
                supported: true,
                enforced: false,
                policy: Some(policy),
            }
        }
        Err(err) => {
            tracing::error!(policy = policy_name, error = %err, "trusted types enforced and policy creation failed");
            GuardState {
                supported: true,
                enforced: true,
                policy: None,
            }
        }
    }
}

/// Whether rendering must stop: enforcement with no compliant channel.
#[must_use]
pub fn should_abort(state: &GuardState) -> bool {
    state.enforced && state.policy.is_none()
}

/// Allow-list clean `html` (scripts, event handlers and `javascript:` URLs
/// removed).
#[must_use]
pub fn sanitize_markup(html: &str) -> String {
    ammonia::clean(html)
}

/// Escape `text` for insertion as HTML text content.
#[must_use]
pub fn sanitize_text(text: &str) -> String {
    v_htmlescape::escape(text).to_string()
}

/// Markup ready for DOM insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardedMarkup {
    /// Cleaned and wrapped by the policy.
    Trusted(TrustedHtml),
    /// Cleaned only; the page has no trusted-types factory.
    Sanitized(String),
}

impl GuardedMarkup {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Trusted(html) => html.as_str(),
            Self::Sanitized(html) => html,
        }
    }

    #[must_use]
    pub fn is_trusted(&self) -> bool {
        matches!(self, Self::Trusted(_))
    }
}

/// Sanitize `html`, then wrap it through the policy if one exists.
pub fn sanitize_with_guard(html: &str, state: &GuardState) -> Result<GuardedMarkup, GuardError> {
    let clean = sanitize_markup(html);
    match &state.policy {
        Some(policy) => Ok(GuardedMarkup::Trusted(policy.create_html(&clean)?)),
        None if state.enforced => Err(GuardError::Enforced),
        None => Ok(GuardedMarkup::Sanitized(clean)),
    }
}
