#![forbid(unsafe_code)]

//! Router construction options.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::route::{RouteTemplateOverrides, RouteTemplates};

/// How the route and plan are reflected into the address bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryMode {
    /// In-memory only; the address bar is never touched.
    None,
    /// `?route=/events/slug&plan=...`
    #[default]
    Query,
    /// `#/events/slug?plan=...`
    Hash,
    /// The real pathname, with `?plan=...`. Requires the page-wide path claim.
    Path,
}

impl HistoryMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Query => "query",
            Self::Hash => "hash",
            Self::Path => "path",
        }
    }

    /// Whether this mode writes to session history.
    #[must_use]
    pub const fn writes_history(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for HistoryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scope at which the router intercepts navigation clicks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteTakeover {
    #[default]
    None,
    /// Clicks inside the embed's container.
    Container,
    /// Clicks anywhere in the document. Requires the page-wide takeover claim.
    Document,
}

impl RouteTakeover {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Container => "container",
            Self::Document => "document",
        }
    }
}

impl fmt::Display for RouteTakeover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options supplied once at router construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterOptions {
    pub history_mode: HistoryMode,
    pub route_takeover: RouteTakeover,
    /// Replaces `/events` in both default templates.
    pub base_path: Option<String>,
    /// Explicit templates; win over `base_path`.
    pub route_templates: Option<RouteTemplateOverrides>,
    /// Identifies the embed in logs and ownership claims.
    pub embed_id: String,
}

impl RouterOptions {
    #[must_use]
    pub fn new(embed_id: impl Into<String>) -> Self {
        Self {
            embed_id: embed_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn history_mode(mut self, mode: HistoryMode) -> Self {
        self.history_mode = mode;
        self
    }

    #[must_use]
    pub fn route_takeover(mut self, takeover: RouteTakeover) -> Self {
        self.route_takeover = takeover;
        self
    }

    #[must_use]
    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = Some(base_path.into());
        self
    }

    #[must_use]
    pub fn route_templates(mut self, templates: RouteTemplateOverrides) -> Self {
        self.route_templates = Some(templates);
        self
    }

    /// Templates after applying `base_path` and overrides.
    #[must_use]
    pub fn templates(&self) -> RouteTemplates {
        RouteTemplates::resolve(self.base_path.as_deref(), self.route_templates.as_ref())
    }
}
