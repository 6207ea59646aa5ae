#![forbid(unsafe_code)]

//! Per-embed history router.
//!
//! # Ownership arbitration
//!
//! Path routing and document-wide click capture are page-global: only one
//! embed may own each. At construction the router claims what it was asked
//! for in the page's [`OwnershipRegistry`]. A lost claim is not an error:
//! the router logs a warning and degrades (`path` to `query`, `document` to
//! `container`). Claims are released by [`HistoryRouter::destroy`], which
//! also runs on drop.
//!
//! Takeover is arbitrated whatever the history mode, but clicks are only
//! intercepted in `path` mode.
//!
//! # Event flow
//!
//! The host owns the event loop. It forwards `popstate`, `hashchange`, and
//! capture-phase clicks for the listeners the router registered; each handler
//! recomputes the [`RouteSnapshot`] synchronously and notifies route
//! subscribers before returning.

use std::sync::atomic::{AtomicU64, Ordering};

use url::Url;
use wrt_codec::{CodecError, PlanCodec, PlanDocument};
use wrt_core::{
    BrowserHost, EventBus, HostError, ListenerId, ListenerKind, ListenerRegistry, ListenerSpec,
    ListenerTarget, OwnershipKey, OwnershipRegistry,
};

use crate::click::{ClickDisposition, ClickEvent, ClickIgnoredReason, MouseButton, PathNode};
use crate::options::{HistoryMode, RouteTakeover, RouterOptions};
use crate::route::{
    HashFragment, ROUTE_PARAM, RouteMatch, RouteSnapshot, RouteTarget, RouteTemplates,
    format_route_path, get_route_snapshot, match_route_from_path, with_query_param,
};

/// Query (or fragment) parameter carrying the encoded plan.
pub const PLAN_PARAM: &str = "plan";

const ROUTE_CHANGED: &str = "route:changed";

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// What a history write ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryWrite {
    Pushed,
    Replaced,
    /// `pushState` failed and the page was sent to the URL instead.
    HardNavigated,
    /// Route changed without touching the address bar.
    InMemory,
    /// Nothing to do (`none` mode, destroyed router, unresolvable target).
    Skipped,
    /// The host rejected every attempt.
    Failed,
}

impl HistoryWrite {
    /// Whether the address bar now shows the new URL.
    #[must_use]
    pub const fn landed(self) -> bool {
        matches!(self, Self::Pushed | Self::Replaced | Self::HardNavigated)
    }
}

/// Options for [`HistoryRouter::set_plan`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetPlanOptions {
    pub replace: bool,
}

/// Options for [`HistoryRouter::navigate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavigateOptions {
    pub replace: bool,
}

/// Where to navigate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigateTarget {
    /// A URL or path, resolved against the current location.
    Href(String),
    Route(RouteTarget),
}

impl From<&str> for NavigateTarget {
    fn from(href: &str) -> Self {
        Self::Href(href.to_owned())
    }
}

impl From<String> for NavigateTarget {
    fn from(href: String) -> Self {
        Self::Href(href)
    }
}

impl From<RouteTarget> for NavigateTarget {
    fn from(target: RouteTarget) -> Self {
        Self::Route(target)
    }
}

/// What triggered a route change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteChangeCause {
    PopState,
    HashChange,
    Navigate,
}

/// Published to route subscribers after every snapshot update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteChange {
    pub cause: RouteChangeCause,
    pub current: RouteSnapshot,
    pub previous: Option<RouteSnapshot>,
}

/// Keeps one embed's route in sync with the address bar.
pub struct HistoryRouter<H: BrowserHost> {
    host: H,
    registry: OwnershipRegistry,
    owner_id: String,
    options: RouterOptions,
    templates: RouteTemplates,
    codec: PlanCodec,
    mode: HistoryMode,
    takeover: RouteTakeover,
    claims: Vec<OwnershipKey>,
    listeners: ListenerRegistry,
    current: RouteSnapshot,
    previous: Option<RouteSnapshot>,
    hydrated: bool,
    destroyed: bool,
    subscribers: EventBus<RouteChange>,
}

impl<H: BrowserHost> std::fmt::Debug for HistoryRouter<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryRouter")
            .field("owner_id", &self.owner_id)
            .field("mode", &self.mode)
            .field("takeover", &self.takeover)
            .field("claims", &self.claims)
            .field("current", &self.current)
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

impl<H: BrowserHost> HistoryRouter<H> {
    /// Build a router, resolving its mode against `registry`.
    ///
    /// Fails only when the host cannot report its location; nothing has been
    /// claimed or registered in that case.
    pub fn new(
        host: H,
        registry: OwnershipRegistry,
        options: RouterOptions,
    ) -> Result<Self, HostError> {
        Self::with_codec(host, registry, options, PlanCodec::default())
    }

    /// [`new`](Self::new) with an explicit codec set.
    pub fn with_codec(
        host: H,
        registry: OwnershipRegistry,
        options: RouterOptions,
        codec: PlanCodec,
    ) -> Result<Self, HostError> {
        let location = host.location()?;
        let seq = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
        let owner_id = format!("{}#{seq}", options.embed_id);
        let templates = options.templates();
        let mut claims = Vec::new();

        let mode = match options.history_mode {
            HistoryMode::Path if registry.claim(OwnershipKey::PathRouting, &owner_id) => {
                claims.push(OwnershipKey::PathRouting);
                HistoryMode::Path
            }
            HistoryMode::Path => {
                tracing::warn!(
                    embed = %options.embed_id,
                    owner = ?registry.owner(OwnershipKey::PathRouting),
                    "path routing already owned; falling back to query mode"
                );
                HistoryMode::Query
            }
            other => other,
        };

        let takeover = match options.route_takeover {
            RouteTakeover::None => RouteTakeover::None,
            RouteTakeover::Document
                if registry.claim(OwnershipKey::DocumentTakeover, &owner_id) =>
            {
                claims.push(OwnershipKey::DocumentTakeover);
                RouteTakeover::Document
            }
            RouteTakeover::Document => {
                tracing::warn!(
                    embed = %options.embed_id,
                    owner = ?registry.owner(OwnershipKey::DocumentTakeover),
                    "document takeover already owned; falling back to container"
                );
                RouteTakeover::Container
            }
            RouteTakeover::Container => RouteTakeover::Container,
        };

        let mut listeners = ListenerRegistry::new();
        listeners.register(
            &host,
            ListenerSpec::new(ListenerTarget::Window, ListenerKind::PopState),
        );
        if mode == HistoryMode::Hash {
            listeners.register(
                &host,
                ListenerSpec::new(ListenerTarget::Window, ListenerKind::HashChange),
            );
        }
        match takeover {
            RouteTakeover::Document => listeners.register(
                &host,
                ListenerSpec::new(ListenerTarget::Document, ListenerKind::Click).capturing(),
            ),
            RouteTakeover::Container => listeners.register(
                &host,
                ListenerSpec::new(ListenerTarget::Container, ListenerKind::Click).capturing(),
            ),
            RouteTakeover::None => {}
        }

        if takeover != RouteTakeover::None && mode != HistoryMode::Path {
            tracing::debug!(
                embed = %options.embed_id,
                %takeover,
                %mode,
                "click interception needs path mode; clicks left to the host"
            );
        }

        let current = get_route_snapshot(&location, mode, &templates);
        tracing::debug!(
            embed = %options.embed_id,
            %mode,
            %takeover,
            view = %current.view,
            "history router ready"
        );

        Ok(Self {
            host,
            registry,
            owner_id,
            options,
            templates,
            codec,
            mode,
            takeover,
            claims,
            listeners,
            current,
            previous: None,
            hydrated: false,
            destroyed: false,
            subscribers: EventBus::new(),
        })
    }

    /// Effective history mode after arbitration.
    #[must_use]
    pub fn mode(&self) -> HistoryMode {
        self.mode
    }

    /// Effective takeover scope after arbitration.
    #[must_use]
    pub fn takeover(&self) -> RouteTakeover {
        self.takeover
    }

    #[must_use]
    pub fn current_route(&self) -> &RouteSnapshot {
        &self.current
    }

    #[must_use]
    pub fn previous_route(&self) -> Option<&RouteSnapshot> {
        self.previous.as_ref()
    }

    #[must_use]
    pub fn previous_url(&self) -> Option<&Url> {
        self.previous.as_ref().map(|snapshot| &snapshot.url)
    }

    #[must_use]
    pub fn templates(&self) -> &RouteTemplates {
        &self.templates
    }

    #[must_use]
    pub fn options(&self) -> &RouterOptions {
        &self.options
    }

    /// Identity used for ownership claims: the embed id plus an instance
    /// sequence number.
    #[must_use]
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Claims currently held.
    #[must_use]
    pub fn claims(&self) -> &[OwnershipKey] {
        &self.claims
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Write `plan` into the address bar.
    ///
    /// Codec failures propagate; host failures are logged and reported in
    /// the returned [`HistoryWrite`].
    pub fn set_plan(
        &mut self,
        plan: &PlanDocument,
        options: SetPlanOptions,
    ) -> Result<HistoryWrite, CodecError> {
        if self.destroyed || !self.mode.writes_history() {
            return Ok(HistoryWrite::Skipped);
        }
        let token = self.codec.encode(plan)?;
        let location = match self.host.location() {
            Ok(location) => location,
            Err(err) => {
                tracing::error!(embed = %self.options.embed_id, error = %err, "cannot read location; plan not written");
                return Ok(HistoryWrite::Failed);
            }
        };

        let next = match self.mode {
            HistoryMode::Hash => {
                let mut fragment = HashFragment::parse(location.fragment());
                if fragment.path.is_empty() {
                    fragment.path = self.current.pathname.clone();
                }
                fragment.set_param(PLAN_PARAM, token.as_str());
                let mut next = location.clone();
                next.set_fragment(fragment.render().as_deref());
                next
            }
            _ => with_query_param(&location, PLAN_PARAM, token.as_str()),
        };

        let replace = options.replace || (self.mode == HistoryMode::Path && !self.hydrated);
        self.hydrated = true;
        let write = self.write_history(&next, replace);
        if write.landed() {
            self.current.url = next;
        }
        tracing::debug!(
            embed = %self.options.embed_id,
            scheme = ?token.scheme(),
            len = token.len(),
            ?write,
            "plan written"
        );
        Ok(write)
    }

    /// Decode the plan currently in the address bar, if any.
    pub fn current_plan(&self) -> Result<Option<PlanDocument>, CodecError> {
        let location = match self.host.location() {
            Ok(location) => location,
            Err(err) => {
                tracing::warn!(error = %err, "cannot read location; using last snapshot");
                self.current.url.clone()
            }
        };
        let token = match self.mode {
            HistoryMode::None => None,
            HistoryMode::Hash => HashFragment::parse(location.fragment())
                .param(PLAN_PARAM)
                .map(str::to_owned),
            HistoryMode::Query | HistoryMode::Path => location
                .query_pairs()
                .find(|(key, _)| key == PLAN_PARAM)
                .map(|(_, value)| value.into_owned()),
        };
        token
            .filter(|token| !token.is_empty())
            .map(|token| self.codec.decode(&token))
            .transpose()
    }

    /// Navigate to `target`.
    ///
    /// Unresolvable targets are logged and ignored.
    pub fn navigate(
        &mut self,
        target: impl Into<NavigateTarget>,
        options: NavigateOptions,
    ) -> HistoryWrite {
        if self.destroyed {
            return HistoryWrite::Skipped;
        }
        let route = match target.into() {
            NavigateTarget::Route(target) => {
                let pathname = format_route_path(&target, &self.templates);
                RouteMatch {
                    view: target.view,
                    slug: target.slug,
                    pathname,
                }
            }
            NavigateTarget::Href(href) => match self.resolve_href(&href) {
                Ok(route) => route,
                Err(reason) => {
                    tracing::warn!(
                        embed = %self.options.embed_id,
                        %href,
                        ?reason,
                        "navigation target not recognised; ignoring"
                    );
                    return HistoryWrite::Skipped;
                }
            },
        };
        self.navigate_to(route, options.replace)
    }

    /// Recompute the route after a `popstate`.
    ///
    /// Returns `false` when destroyed or the location cannot be read.
    pub fn handle_popstate(&mut self) -> bool {
        self.refresh(RouteChangeCause::PopState)
    }

    /// Recompute the route after a `hashchange`. Ignored outside hash mode.
    pub fn handle_hashchange(&mut self) -> bool {
        if self.mode != HistoryMode::Hash {
            return false;
        }
        self.refresh(RouteChangeCause::HashChange)
    }

    /// Decide what to do with a capture-phase click.
    pub fn handle_click(&mut self, event: &ClickEvent) -> ClickDisposition {
        use ClickIgnoredReason as Reason;

        if self.destroyed
            || self.takeover == RouteTakeover::None
            || self.mode != HistoryMode::Path
        {
            return ClickDisposition::Ignored(Reason::Inactive);
        }
        let Some(PathNode::Anchor {
            href,
            target,
            download,
        }) = event.anchor()
        else {
            return ClickDisposition::Ignored(Reason::NoAnchor);
        };
        if event.default_prevented {
            return ClickDisposition::Ignored(Reason::AlreadyPrevented);
        }
        if event.button != MouseButton::Primary {
            return ClickDisposition::Ignored(Reason::NonPrimaryButton);
        }
        if event.modifiers.any() {
            return ClickDisposition::Ignored(Reason::Modified);
        }
        if target
            .as_deref()
            .is_some_and(|t| !t.is_empty() && !t.eq_ignore_ascii_case("_self"))
        {
            return ClickDisposition::Ignored(Reason::ForeignTarget);
        }
        if *download {
            return ClickDisposition::Ignored(Reason::Download);
        }
        let Some(href) = href.as_deref() else {
            return ClickDisposition::Ignored(Reason::MissingHref);
        };
        let route = match self.resolve_href(href) {
            Ok(route) => route,
            Err(reason) => return ClickDisposition::Ignored(reason),
        };
        let write = self.navigate_to(route.clone(), false);
        tracing::debug!(embed = %self.options.embed_id, pathname = %route.pathname, ?write, "click intercepted");
        ClickDisposition::Intercepted { route, write }
    }

    /// Subscribe to route changes.
    pub fn on_route_change(&self, callback: impl Fn(&RouteChange) + 'static) -> ListenerId {
        self.subscribers.on(ROUTE_CHANGED, callback)
    }

    /// Remove a route subscriber.
    pub fn off_route_change(&self, id: ListenerId) -> bool {
        self.subscribers.off(ROUTE_CHANGED, id)
    }

    /// Remove listeners and release held claims.
    ///
    /// Idempotent. Returns `true` on the call that did the teardown.
    pub fn destroy(&mut self) -> bool {
        if self.destroyed {
            return false;
        }
        self.destroyed = true;
        let removed = self.listeners.remove_all(&self.host);
        let mut released = 0;
        for key in self.claims.drain(..) {
            if self.registry.release(key, &self.owner_id) {
                released += 1;
            }
        }
        self.subscribers.clear();
        tracing::debug!(
            embed = %self.options.embed_id,
            listeners = removed,
            claims = released,
            "history router destroyed"
        );
        true
    }

    fn resolve_href(&self, href: &str) -> Result<RouteMatch, ClickIgnoredReason> {
        let base = self
            .host
            .location()
            .unwrap_or_else(|_| self.current.url.clone());
        let resolved = base.join(href).map_err(|_| ClickIgnoredReason::InvalidHref)?;
        if resolved.origin() != base.origin() {
            return Err(ClickIgnoredReason::CrossOrigin);
        }
        match_route_from_path(resolved.path(), &self.templates).ok_or(ClickIgnoredReason::UnknownRoute)
    }

    fn navigate_to(&mut self, route: RouteMatch, replace: bool) -> HistoryWrite {
        if self.mode == HistoryMode::None {
            let snapshot = RouteSnapshot::from_match(route, self.current.url.clone());
            self.commit(snapshot, RouteChangeCause::Navigate);
            return HistoryWrite::InMemory;
        }

        let location = match self.host.location() {
            Ok(location) => location,
            Err(err) => {
                tracing::error!(embed = %self.options.embed_id, error = %err, "cannot read location; navigation dropped");
                return HistoryWrite::Failed;
            }
        };
        let next = match self.mode {
            HistoryMode::Path => {
                let mut next = location;
                next.set_path(&route.pathname);
                next.set_fragment(None);
                next
            }
            HistoryMode::Hash => {
                let mut fragment = HashFragment::parse(location.fragment());
                fragment.path.clone_from(&route.pathname);
                let mut next = location;
                next.set_fragment(fragment.render().as_deref());
                next
            }
            _ => with_query_param(&location, ROUTE_PARAM, &route.pathname),
        };

        let write = self.write_history(&next, replace);
        if write.landed() {
            let snapshot = get_route_snapshot(&next, self.mode, &self.templates);
            self.commit(snapshot, RouteChangeCause::Navigate);
        }
        write
    }

    fn refresh(&mut self, cause: RouteChangeCause) -> bool {
        if self.destroyed {
            return false;
        }
        match self.host.location() {
            Ok(location) => {
                let snapshot = if self.mode == HistoryMode::None {
                    RouteSnapshot {
                        url: location,
                        ..self.current.clone()
                    }
                } else {
                    get_route_snapshot(&location, self.mode, &self.templates)
                };
                self.commit(snapshot, cause);
                true
            }
            Err(err) => {
                tracing::warn!(embed = %self.options.embed_id, error = %err, ?cause, "cannot read location");
                false
            }
        }
    }

    fn commit(&mut self, snapshot: RouteSnapshot, cause: RouteChangeCause) {
        let previous = std::mem::replace(&mut self.current, snapshot);
        self.previous = Some(previous);
        self.subscribers.emit(
            ROUTE_CHANGED,
            &RouteChange {
                cause,
                current: self.current.clone(),
                previous: self.previous.clone(),
            },
        );
    }

    fn write_history(&self, url: &Url, replace: bool) -> HistoryWrite {
        if replace {
            return match self.host.replace_state(url) {
                Ok(()) => HistoryWrite::Replaced,
                Err(err) => {
                    tracing::error!(embed = %self.options.embed_id, error = %err, %url, "replaceState failed");
                    HistoryWrite::Failed
                }
            };
        }
        match self.host.push_state(url) {
            Ok(()) => HistoryWrite::Pushed,
            Err(err) => {
                tracing::error!(embed = %self.options.embed_id, error = %err, %url, "pushState failed; navigating");
                match self.host.assign(url) {
                    Ok(()) => HistoryWrite::HardNavigated,
                    Err(err) => {
                        tracing::error!(embed = %self.options.embed_id, error = %err, %url, "hard navigation failed");
                        HistoryWrite::Failed
                    }
                }
            }
        }
    }
}

impl<H: BrowserHost> Drop for HistoryRouter<H> {
    fn drop(&mut self) {
        self.destroy();
    }
}
