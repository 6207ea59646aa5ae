#![forbid(unsafe_code)]

//! Host-neutral description of a capture-phase click and the router's
//! decision about it.
//!
//! The host walks `event.composedPath()` and reports each node, so anchors
//! inside shadow roots are found the same way as light-DOM ones.

use crate::route::RouteMatch;
use crate::router::HistoryWrite;

/// `MouseEvent.button`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MouseButton {
    #[default]
    Primary,
    Auxiliary,
    Secondary,
    Other(i16),
}

impl MouseButton {
    #[must_use]
    pub const fn from_dom(button: i16) -> Self {
        match button {
            0 => Self::Primary,
            1 => Self::Auxiliary,
            2 => Self::Secondary,
            other => Self::Other(other),
        }
    }
}

/// Modifier keys held during the click.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClickModifiers {
    pub alt: bool,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
}

impl ClickModifiers {
    #[must_use]
    pub const fn any(self) -> bool {
        self.alt || self.ctrl || self.meta || self.shift
    }
}

/// One node of the event's composed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathNode {
    Anchor {
        /// Raw `href` attribute.
        href: Option<String>,
        /// `target` attribute.
        target: Option<String>,
        /// Whether `download` is present.
        download: bool,
    },
    Other,
}

impl PathNode {
    /// An anchor with only an `href`.
    #[must_use]
    pub fn anchor(href: impl Into<String>) -> Self {
        Self::Anchor {
            href: Some(href.into()),
            target: None,
            download: false,
        }
    }
}

/// A click as reported by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClickEvent {
    pub button: MouseButton,
    pub modifiers: ClickModifiers,
    pub default_prevented: bool,
    /// Innermost node first.
    pub path: Vec<PathNode>,
}

impl ClickEvent {
    /// A plain primary click on `path`.
    #[must_use]
    pub fn primary(path: Vec<PathNode>) -> Self {
        Self {
            path,
            ..Self::default()
        }
    }

    pub(crate) fn anchor(&self) -> Option<&PathNode> {
        self.path
            .iter()
            .find(|node| matches!(node, PathNode::Anchor { .. }))
    }
}

/// Why a click was left to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickIgnoredReason {
    /// No takeover, not in path mode, or destroyed.
    Inactive,
    NoAnchor,
    AlreadyPrevented,
    NonPrimaryButton,
    Modified,
    /// `target` names another browsing context.
    ForeignTarget,
    Download,
    MissingHref,
    InvalidHref,
    CrossOrigin,
    UnknownRoute,
}

/// Outcome of [`HistoryRouter::handle_click`](crate::HistoryRouter::handle_click).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickDisposition {
    /// The host should call `preventDefault()`; the router navigated.
    Intercepted { route: RouteMatch, write: HistoryWrite },
    Ignored(ClickIgnoredReason),
}

impl ClickDisposition {
    /// Whether the host must call `preventDefault()`.
    #[must_use]
    pub const fn prevent_default(&self) -> bool {
        matches!(self, Self::Intercepted { .. })
    }
}
