#![forbid(unsafe_code)]

//! Route templates, matching, and snapshots.
//!
//! A route is either the list view or a detail view keyed by a slug. Two
//! templates map routes to pathnames:
//!
//! | View | Default template |
//! |------|------------------|
//! | list | `/events` |
//! | detail | `/events/:slug` |
//!
//! [`match_route_from_path`] and [`format_route_path`] are inverses over the
//! pathnames the templates describe. Unmatched paths yield `None`: the page's
//! path may belong to the host rather than to this route scheme.

use std::fmt;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::options::HistoryMode;

/// Default list pathname, also the default base path.
pub const DEFAULT_BASE_PATH: &str = "/events";

/// Placeholder segment in detail templates.
pub const SLUG_PLACEHOLDER: &str = ":slug";

/// Query parameter carrying the route path in [`HistoryMode::Query`].
pub const ROUTE_PARAM: &str = "route";

/// Bytes escaped inside a single path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Which view a route renders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    List,
    Detail,
}

impl View {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Detail => "detail",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A route to render into a pathname.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteTarget {
    pub view: View,
    pub slug: Option<String>,
}

impl RouteTarget {
    #[must_use]
    pub const fn list() -> Self {
        Self {
            view: View::List,
            slug: None,
        }
    }

    #[must_use]
    pub fn detail(slug: impl Into<String>) -> Self {
        Self {
            view: View::Detail,
            slug: Some(slug.into()),
        }
    }
}

/// A pathname recognised by [`match_route_from_path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteMatch {
    pub view: View,
    pub slug: Option<String>,
    pub pathname: String,
}

impl RouteMatch {
    /// The route without its pathname.
    #[must_use]
    pub fn target(&self) -> RouteTarget {
        RouteTarget {
            view: self.view,
            slug: self.slug.clone(),
        }
    }
}

/// Template overrides as supplied in options or configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteTemplateOverrides {
    pub list: Option<String>,
    pub detail: Option<String>,
}

/// Resolved list and detail templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTemplates {
    pub list: String,
    pub detail: String,
}

impl Default for RouteTemplates {
    fn default() -> Self {
        Self::from_base_path(DEFAULT_BASE_PATH)
    }
}

impl RouteTemplates {
    /// List at `base_path`, detail at `base_path/:slug`.
    #[must_use]
    pub fn from_base_path(base_path: &str) -> Self {
        let list = normalize_path(base_path);
        let detail = if list == "/" {
            format!("/{SLUG_PLACEHOLDER}")
        } else {
            format!("{list}/{SLUG_PLACEHOLDER}")
        };
        Self { list, detail }
    }

    /// Apply a base path and explicit overrides, in that order.
    #[must_use]
    pub fn resolve(base_path: Option<&str>, overrides: Option<&RouteTemplateOverrides>) -> Self {
        let mut templates = base_path.map_or_else(Self::default, Self::from_base_path);
        if let Some(overrides) = overrides {
            if let Some(list) = &overrides.list {
                templates.list = normalize_path(list);
            }
            if let Some(detail) = &overrides.detail {
                templates.detail = normalize_path(detail);
            }
        }
        templates
    }

    #[must_use]
    pub fn with_list(mut self, template: &str) -> Self {
        self.list = normalize_path(template);
        self
    }

    #[must_use]
    pub fn with_detail(mut self, template: &str) -> Self {
        self.detail = normalize_path(template);
        self
    }

    /// Whether the detail template has a slug placeholder.
    #[must_use]
    pub fn detail_has_slug(&self) -> bool {
        self.detail.split('/').any(|segment| segment == SLUG_PLACEHOLDER)
    }
}

/// Render `target` into a pathname.
///
/// A detail target without a slug renders as the list path.
#[must_use]
pub fn format_route_path(target: &RouteTarget, templates: &RouteTemplates) -> String {
    match (target.view, target.slug.as_deref()) {
        (View::Detail, Some(slug)) => {
            let encoded = utf8_percent_encode(slug, SEGMENT).to_string();
            templates
                .detail
                .split('/')
                .map(|segment| {
                    if segment == SLUG_PLACEHOLDER {
                        encoded.as_str()
                    } else {
                        segment
                    }
                })
                .collect::<Vec<_>>()
                .join("/")
        }
        _ => templates.list.clone(),
    }
}

/// Recognise `pathname` as a list or detail route.
///
/// A single trailing slash is ignored. Returns `None` for anything else.
#[must_use]
pub fn match_route_from_path(pathname: &str, templates: &RouteTemplates) -> Option<RouteMatch> {
    let pathname = normalize_path(pathname);
    if pathname == templates.list {
        return Some(RouteMatch {
            view: View::List,
            slug: None,
            pathname,
        });
    }

    let template: Vec<&str> = templates.detail.split('/').collect();
    let actual: Vec<&str> = pathname.split('/').collect();
    if template.len() != actual.len() {
        return None;
    }
    let mut slug = None;
    for (expected, segment) in template.iter().zip(&actual) {
        if *expected == SLUG_PLACEHOLDER {
            if segment.is_empty() {
                return None;
            }
            let decoded = percent_decode_str(segment).decode_utf8().ok()?;
            slug = Some(decoded.into_owned());
        } else if expected != segment {
            return None;
        }
    }
    slug.as_ref()?;
    Some(RouteMatch {
        view: View::Detail,
        slug,
        pathname,
    })
}

/// The route as seen in the address bar at one moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSnapshot {
    pub view: View,
    pub slug: Option<String>,
    pub pathname: String,
    pub url: Url,
}

impl RouteSnapshot {
    /// Snapshot of an already-matched route at `url`.
    #[must_use]
    pub fn from_match(route: RouteMatch, url: Url) -> Self {
        Self {
            view: route.view,
            slug: route.slug,
            pathname: route.pathname,
            url,
        }
    }

    /// The list view at `url`.
    #[must_use]
    pub fn list(templates: &RouteTemplates, url: Url) -> Self {
        Self {
            view: View::List,
            slug: None,
            pathname: templates.list.clone(),
            url,
        }
    }

    #[must_use]
    pub fn target(&self) -> RouteTarget {
        RouteTarget {
            view: self.view,
            slug: self.slug.clone(),
        }
    }
}

/// Compute the route encoded in `location` under `mode`.
///
/// Locations without a recognisable route fall back to the list view. In
/// path mode the fallback keeps the real pathname so hosts can tell where
/// the embed is mounted.
#[must_use]
pub fn get_route_snapshot(
    location: &Url,
    mode: HistoryMode,
    templates: &RouteTemplates,
) -> RouteSnapshot {
    let route_path = match mode {
        HistoryMode::Path => Some(location.path().to_owned()),
        HistoryMode::Query => location
            .query_pairs()
            .find(|(key, _)| key == ROUTE_PARAM)
            .map(|(_, value)| value.into_owned()),
        HistoryMode::Hash => {
            let fragment = HashFragment::parse(location.fragment());
            (!fragment.path.is_empty()).then_some(fragment.path)
        }
        HistoryMode::None => None,
    };

    match route_path.as_deref() {
        Some(path) => match match_route_from_path(path, templates) {
            Some(route) => RouteSnapshot::from_match(route, location.clone()),
            None if mode == HistoryMode::Path => RouteSnapshot {
                view: View::List,
                slug: None,
                pathname: path.to_owned(),
                url: location.clone(),
            },
            None => RouteSnapshot::list(templates, location.clone()),
        },
        None => RouteSnapshot::list(templates, location.clone()),
    }
}

/// A fragment of the form `#/route/path?key=value&...`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct HashFragment {
    pub path: String,
    pub params: Vec<(String, String)>,
}

impl HashFragment {
    pub fn parse(fragment: Option<&str>) -> Self {
        let Some(fragment) = fragment.filter(|f| !f.is_empty()) else {
            return Self::default();
        };
        let (path, query) = match fragment.split_once('?') {
            Some((path, query)) => (path, query),
            None if fragment.starts_with('/') => (fragment, ""),
            None => ("", fragment),
        };
        let path = if path.starts_with('/') {
            path.to_owned()
        } else {
            String::new()
        };
        let params = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        Self { path, params }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_param(&mut self, key: &str, value: &str) {
        self.params.retain(|(k, _)| k != key);
        self.params.push((key.to_owned(), value.to_owned()));
    }

    /// Serialised fragment, or `None` when there is nothing to write.
    pub fn render(&self) -> Option<String> {
        if self.path.is_empty() && self.params.is_empty() {
            return None;
        }
        let mut out = self.path.clone();
        if !self.params.is_empty() {
            out.push('?');
            out.push_str(
                &url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(&self.params)
                    .finish(),
            );
        }
        Some(out)
    }
}

/// Copy of `url` with query parameter `key` set to `value`, keeping the
/// other parameters in order.
pub(crate) fn with_query_param(url: &Url, key: &str, value: &str) -> Url {
    let mut next = url.clone();
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    next.query_pairs_mut()
        .clear()
        .extend_pairs(&kept)
        .append_pair(key, value);
    next
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    let mut out = if trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    };
    while out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}
