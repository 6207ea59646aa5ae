#![forbid(unsafe_code)]

//! History router for the wrt embed runtime.
//!
//! Keeps an embed's list/detail route and encoded plan in sync with the
//! address bar in one of four [`HistoryMode`]s, and arbitrates page-global
//! capabilities (path routing, document-wide click capture) between embeds
//! sharing one page.
//!
//! # Example
//!
//! ```
//! use wrt_router::{RouteTarget, RouteTemplates, format_route_path, match_route_from_path};
//!
//! let templates = RouteTemplates::default().with_detail("/calendar/:slug");
//! let path = format_route_path(&RouteTarget::detail("block-party"), &templates);
//! assert_eq!(path, "/calendar/block-party");
//! assert_eq!(
//!     match_route_from_path(&path, &templates).and_then(|m| m.slug),
//!     Some("block-party".to_owned())
//! );
//! ```

mod click;
mod options;
mod route;
mod router;

pub use click::{ClickDisposition, ClickEvent, ClickIgnoredReason, ClickModifiers, MouseButton, PathNode};
pub use options::{HistoryMode, RouteTakeover, RouterOptions};
pub use route::{
    DEFAULT_BASE_PATH, ROUTE_PARAM, RouteMatch, RouteSnapshot, RouteTarget, RouteTemplateOverrides,
    RouteTemplates, SLUG_PLACEHOLDER, View, format_route_path, get_route_snapshot,
    match_route_from_path,
};
pub use router::{
    HistoryRouter, HistoryWrite, NavigateOptions, NavigateTarget, PLAN_PARAM, RouteChange,
    RouteChangeCause, SetPlanOptions,
};
