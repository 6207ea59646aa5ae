#![forbid(unsafe_code)]

//! JS-facing shapes and labels, kept free of `wasm-bindgen` so they can be
//! tested natively.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use wrt::router::{
    ClickDisposition, ClickEvent, ClickIgnoredReason, ClickModifiers, HistoryWrite, MouseButton,
    PathNode, RouteSnapshot,
};
use wrt::{MountError, RuntimeConfig};

/// One node of `event.composedPath()`, as read by the glue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NodeDescriptor {
    /// `tagName`, any case.
    pub tag: String,
    pub href: Option<String>,
    pub target: Option<String>,
    pub download: bool,
}

impl NodeDescriptor {
    pub fn into_path_node(self) -> PathNode {
        if self.tag.eq_ignore_ascii_case("a") {
            PathNode::Anchor {
                href: self.href,
                target: self.target,
                download: self.download,
            }
        } else {
            PathNode::Other
        }
    }
}

/// A click as read from a `MouseEvent`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClickDescriptor {
    pub button: i16,
    pub alt: bool,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
    pub default_prevented: bool,
    /// Innermost node first.
    pub path: Vec<NodeDescriptor>,
}

impl ClickDescriptor {
    pub fn into_event(self) -> ClickEvent {
        ClickEvent {
            button: MouseButton::from_dom(self.button),
            modifiers: ClickModifiers {
                alt: self.alt,
                ctrl: self.ctrl,
                meta: self.meta,
                shift: self.shift,
            },
            default_prevented: self.default_prevented,
            path: self
                .path
                .into_iter()
                .map(NodeDescriptor::into_path_node)
                .collect(),
        }
    }
}

/// Route as handed to JS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteView {
    pub view: &'static str,
    pub slug: Option<String>,
    pub pathname: String,
    pub href: String,
}

impl From<&RouteSnapshot> for RouteView {
    fn from(route: &RouteSnapshot) -> Self {
        Self {
            view: route.view.as_str(),
            slug: route.slug.clone(),
            pathname: route.pathname.clone(),
            href: route.url.to_string(),
        }
    }
}

pub fn write_label(write: HistoryWrite) -> &'static str {
    match write {
        HistoryWrite::Pushed => "pushed",
        HistoryWrite::Replaced => "replaced",
        HistoryWrite::HardNavigated => "hard_navigated",
        HistoryWrite::InMemory => "in_memory",
        HistoryWrite::Skipped => "skipped",
        HistoryWrite::Failed => "failed",
    }
}

pub fn ignored_label(reason: ClickIgnoredReason) -> &'static str {
    match reason {
        ClickIgnoredReason::Inactive => "inactive",
        ClickIgnoredReason::NoAnchor => "no_anchor",
        ClickIgnoredReason::AlreadyPrevented => "already_prevented",
        ClickIgnoredReason::NonPrimaryButton => "non_primary_button",
        ClickIgnoredReason::Modified => "modified",
        ClickIgnoredReason::ForeignTarget => "foreign_target",
        ClickIgnoredReason::Download => "download",
        ClickIgnoredReason::MissingHref => "missing_href",
        ClickIgnoredReason::InvalidHref => "invalid_href",
        ClickIgnoredReason::CrossOrigin => "cross_origin",
        ClickIgnoredReason::UnknownRoute => "unknown_route",
    }
}

pub fn disposition_label(disposition: &ClickDisposition) -> &'static str {
    match disposition {
        ClickDisposition::Intercepted { .. } => "intercepted",
        ClickDisposition::Ignored(reason) => ignored_label(*reason),
    }
}

/// Stable error code for the glue to branch on.
pub fn mount_error_code(err: &MountError) -> &'static str {
    match err {
        MountError::TrustedContentEnforced => "trusted_content_enforced",
        MountError::InvalidConfig(_) => "invalid_config",
        MountError::Host(_) => "host",
    }
}

/// Notices collected while the runtime is borrowed.
///
/// Route subscribers run inside router calls, which hold the runtime borrow.
/// They push here instead of calling JS; the glue drains the queue once the
/// borrow is released, so a JS callback can call back into the embed.
pub struct NoticeQueue<T> {
    items: Rc<RefCell<VecDeque<T>>>,
}

impl<T> Clone for NoticeQueue<T> {
    fn clone(&self) -> Self {
        Self {
            items: Rc::clone(&self.items),
        }
    }
}

impl<T> Default for NoticeQueue<T> {
    fn default() -> Self {
        Self {
            items: Rc::default(),
        }
    }
}

impl<T> fmt::Debug for NoticeQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoticeQueue")
            .field("pending", &self.len())
            .finish()
    }
}

impl<T> NoticeQueue<T> {
    pub fn push(&self, notice: T) {
        self.items.borrow_mut().push_back(notice);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Hand every queued notice to `deliver`, oldest first.
    ///
    /// The queue is not borrowed while `deliver` runs; notices it pushes are
    /// delivered by the same call.
    pub fn drain(&self, mut deliver: impl FnMut(T)) -> usize {
        let mut delivered = 0;
        loop {
            let next = self.items.borrow_mut().pop_front();
            let Some(notice) = next else {
                break;
            };
            deliver(notice);
            delivered += 1;
        }
        delivered
    }
}

/// Parse and validate a JSON config. An empty string means all defaults.
pub fn parse_config(json: &str) -> Result<RuntimeConfig, String> {
    let config = if json.trim().is_empty() {
        RuntimeConfig::default()
    } else {
        RuntimeConfig::from_json_str(json).map_err(|err| err.to_string())?
    };
    let problems = config.validate();
    if problems.is_empty() {
        Ok(config)
    } else {
        Err(format!("invalid configuration: {}", problems.join("; ")))
    }
}
