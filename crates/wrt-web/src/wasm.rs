#![forbid(unsafe_code)]

//! `wasm-bindgen` exports and the `window`-backed host.
//!
//! Only compiled on `wasm32` targets.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use js_sys::{Function, JSON, Reflect};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Element, Event, EventTarget, HtmlAnchorElement, MouseEvent, Window};

use wrt::core::{
    BrowserHost, HostError, HostListenerId, ListenerId, ListenerKind, ListenerSpec,
    ListenerTarget, OwnershipRegistry, Url,
};
use wrt::events::{ConsentSource, ConsentState, DispatchOutcome};
use wrt::guard::{GuardedMarkup, PolicyError, TrustedHtml, TrustedPolicy, TrustedTypesHost};
use wrt::router::{NavigateOptions, SetPlanOptions};
use wrt::EmbedRuntime;

use crate::bridge::{
    ClickDescriptor, NodeDescriptor, NoticeQueue, RouteView, disposition_label, mount_error_code,
    parse_config, write_label,
};

fn console_error(msg: &str) {
    let global = js_sys::global();
    let Ok(console) = Reflect::get(&global, &"console".into()) else {
        return;
    };
    let Ok(error) = Reflect::get(&console, &"error".into()) else {
        return;
    };
    let Ok(error_fn) = error.dyn_into::<Function>() else {
        return;
    };
    let _ = error_fn.call1(&console, &JsValue::from_str(msg));
}

fn install_panic_hook() {
    use std::sync::Once;

    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        std::panic::set_hook(Box::new(|info| {
            let msg = match info.location() {
                Some(loc) => format!("wrt panic at {}:{}: {info}", loc.file(), loc.line()),
                None => format!("wrt panic: {info}"),
            };
            console_error(&msg);
        }));
    });
}

fn js_message(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            value
                .dyn_ref::<js_sys::Error>()
                .map(|err| String::from(err.message()))
        })
        .unwrap_or_else(|| format!("{value:?}"))
}

fn js_error(msg: impl AsRef<str>) -> JsValue {
    js_sys::Error::new(msg.as_ref()).into()
}

fn to_js<T: serde::Serialize>(value: &T) -> Result<JsValue, JsValue> {
    let json = serde_json::to_string(value).map_err(|err| js_error(err.to_string()))?;
    JSON::parse(&json)
}

fn from_js_json(value: &JsValue) -> Result<serde_json::Value, JsValue> {
    if value.is_undefined() {
        return Ok(serde_json::Value::Null);
    }
    let json: String = JSON::stringify(value)?.into();
    serde_json::from_str(&json).map_err(|err| js_error(err.to_string()))
}

type Sink = Box<dyn Fn(ListenerKind, &Event)>;

struct Attached {
    target: EventTarget,
    spec: ListenerSpec,
    closure: Closure<dyn FnMut(Event)>,
}

/// [`BrowserHost`] over `window`, `document`, and the embed's container.
///
/// DOM events are forwarded to a sink installed after the runtime exists.
pub struct WindowHost {
    window: Window,
    container: Element,
    attached: RefCell<HashMap<u64, Attached>>,
    next_id: Cell<u64>,
    sink: Rc<RefCell<Option<Sink>>>,
}

impl WindowHost {
    fn new(window: Window, container: Element) -> Self {
        Self {
            window,
            container,
            attached: RefCell::default(),
            next_id: Cell::new(1),
            sink: Rc::default(),
        }
    }

    fn set_sink(&self, sink: Sink) {
        *self.sink.borrow_mut() = Some(sink);
    }

    fn event_target(&self, target: ListenerTarget) -> Option<EventTarget> {
        match target {
            ListenerTarget::Window => Some(self.window.clone().into()),
            ListenerTarget::Document => self.window.document().map(Into::into),
            ListenerTarget::Container => Some(self.container.clone().into()),
        }
    }
}

impl BrowserHost for WindowHost {
    fn location(&self) -> Result<Url, HostError> {
        let href = self
            .window
            .location()
            .href()
            .map_err(|err| HostError::InvalidLocation(js_message(&err)))?;
        Url::parse(&href).map_err(|err| HostError::InvalidLocation(err.to_string()))
    }

    fn push_state(&self, url: &Url) -> Result<(), HostError> {
        self.window
            .history()
            .and_then(|history| history.push_state_with_url(&JsValue::NULL, "", Some(url.as_str())))
            .map_err(|err| HostError::HistoryRejected(js_message(&err)))
    }

    fn replace_state(&self, url: &Url) -> Result<(), HostError> {
        self.window
            .history()
            .and_then(|history| {
                history.replace_state_with_url(&JsValue::NULL, "", Some(url.as_str()))
            })
            .map_err(|err| HostError::HistoryRejected(js_message(&err)))
    }

    fn assign(&self, url: &Url) -> Result<(), HostError> {
        self.window
            .location()
            .assign(url.as_str())
            .map_err(|err| HostError::NavigationRejected(js_message(&err)))
    }

    fn add_listener(&self, spec: ListenerSpec) -> HostListenerId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let Some(target) = self.event_target(spec.target) else {
            tracing::warn!(%spec, "listener target unavailable; not attached");
            return HostListenerId(id);
        };
        let sink = Rc::clone(&self.sink);
        let kind = spec.kind;
        let closure = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
            if let Some(sink) = sink.borrow().as_ref() {
                sink(kind, &event);
            }
        });
        if let Err(err) = target.add_event_listener_with_callback_and_bool(
            spec.kind.event_type(),
            closure.as_ref().unchecked_ref(),
            spec.capture,
        ) {
            tracing::warn!(%spec, error = %js_message(&err), "addEventListener failed");
            return HostListenerId(id);
        }
        self.attached.borrow_mut().insert(
            id,
            Attached {
                target,
                spec,
                closure,
            },
        );
        HostListenerId(id)
    }

    fn remove_listener(&self, id: HostListenerId) {
        let Some(attached) = self.attached.borrow_mut().remove(&id.0) else {
            return;
        };
        let _ = attached.target.remove_event_listener_with_callback_and_bool(
            attached.spec.kind.event_type(),
            attached.closure.as_ref().unchecked_ref(),
            attached.spec.capture,
        );
    }
}

fn click_descriptor(event: &MouseEvent) -> ClickDescriptor {
    let path = event
        .composed_path()
        .iter()
        .map(|node| match node.dyn_ref::<HtmlAnchorElement>() {
            Some(anchor) => NodeDescriptor {
                tag: "a".to_owned(),
                href: anchor.get_attribute("href"),
                target: anchor.get_attribute("target"),
                download: anchor.has_attribute("download"),
            },
            None => NodeDescriptor::default(),
        })
        .collect();
    ClickDescriptor {
        button: event.button(),
        alt: event.alt_key(),
        ctrl: event.ctrl_key(),
        meta: event.meta_key(),
        shift: event.shift_key(),
        default_prevented: event.default_prevented(),
        path,
    }
}

/// A policy created through `trustedTypes.createPolicy`.
struct JsPolicy {
    name: String,
    policy: JsValue,
}

impl JsPolicy {
    fn create_html_value(&self, input: &str) -> Result<JsValue, JsValue> {
        let create = Reflect::get(&self.policy, &"createHTML".into())?.dyn_into::<Function>()?;
        create.call1(&self.policy, &JsValue::from_str(input))
    }
}

impl TrustedPolicy for JsPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_html(&self, input: &str) -> Result<TrustedHtml, PolicyError> {
        let value = self
            .create_html_value(input)
            .map_err(|err| PolicyError::Refused {
                name: self.name.clone(),
                reason: js_message(&err),
            })?;
        let html: String = value.unchecked_into::<js_sys::Object>().to_string().into();
        Ok(TrustedHtml::new(html))
    }
}

/// Trusted Types factory on the global object.
#[derive(Default)]
struct WindowTrustedTypes {
    created: RefCell<Option<Rc<JsPolicy>>>,
}

impl WindowTrustedTypes {
    fn factory() -> Option<JsValue> {
        let factory = Reflect::get(&js_sys::global(), &"trustedTypes".into()).ok()?;
        if factory.is_undefined() || factory.is_null() {
            return None;
        }
        Some(factory)
    }

    fn policy(&self) -> Option<Rc<JsPolicy>> {
        self.created.borrow().clone()
    }
}

impl TrustedTypesHost for WindowTrustedTypes {
    fn has_policy_factory(&self) -> bool {
        Self::factory().is_some()
    }

    fn create_policy(&self, name: &str) -> Result<Rc<dyn TrustedPolicy>, PolicyError> {
        let rejected = |reason: String| PolicyError::Rejected {
            name: name.to_owned(),
            reason,
        };
        let factory = Self::factory().ok_or_else(|| rejected("no policy factory".to_owned()))?;
        let create = Reflect::get(&factory, &"createPolicy".into())
            .and_then(|f| f.dyn_into::<Function>().map_err(JsValue::from))
            .map_err(|err| rejected(js_message(&err)))?;

        // Markup is already sanitized before it reaches the policy.
        let identity = Closure::<dyn Fn(String) -> String>::new(|html: String| html);
        let rules = js_sys::Object::new();
        Reflect::set(&rules, &"createHTML".into(), &identity.into_js_value())
            .map_err(|err| rejected(js_message(&err)))?;

        let policy = create
            .call2(&factory, &JsValue::from_str(name), &rules)
            .map_err(|err| rejected(js_message(&err)))?;
        let policy = Rc::new(JsPolicy {
            name: name.to_owned(),
            policy,
        });
        *self.created.borrow_mut() = Some(Rc::clone(&policy));
        Ok(policy)
    }
}

type Runtime = EmbedRuntime<Rc<WindowHost>>;

/// JS route callbacks waiting for the runtime borrow to end.
type RouteNotices = NoticeQueue<(Function, RouteView)>;

fn deliver_route_notices(notices: &RouteNotices) {
    notices.drain(|(callback, view)| match to_js(&view) {
        Ok(route) => {
            if let Err(err) = callback.call1(&JsValue::NULL, &route) {
                tracing::warn!(error = %js_message(&err), "route callback threw");
            }
        }
        Err(err) => tracing::warn!(error = %js_message(&err), "route not serializable"),
    });
}

fn dispatch_event(
    runtime: &Weak<RefCell<Runtime>>,
    notices: &RouteNotices,
    kind: ListenerKind,
    event: &Event,
) {
    let Some(runtime) = runtime.upgrade() else {
        return;
    };
    {
        let Ok(mut runtime) = runtime.try_borrow_mut() else {
            tracing::warn!(event = kind.event_type(), "runtime busy; event skipped");
            return;
        };
        let router = runtime.router_mut();
        match kind {
            ListenerKind::PopState => {
                router.handle_popstate();
            }
            ListenerKind::HashChange => {
                router.handle_hashchange();
            }
            ListenerKind::Click => {
                let Some(mouse) = event.dyn_ref::<MouseEvent>() else {
                    return;
                };
                let disposition = router.handle_click(&click_descriptor(mouse).into_event());
                if disposition.prevent_default() {
                    event.prevent_default();
                }
                tracing::trace!(disposition = disposition_label(&disposition), "click handled");
            }
        }
    }
    deliver_route_notices(notices);
}

/// One embed mounted into a container element.
#[wasm_bindgen]
pub struct EmbedHandle {
    runtime: Rc<RefCell<Runtime>>,
    container: Element,
    trusted_types: WindowTrustedTypes,
    route_listeners: HashMap<u32, ListenerId>,
    next_route_listener: u32,
    notices: RouteNotices,
}

impl EmbedHandle {
    /// Run `f` against the runtime, then deliver route callbacks it queued.
    fn with_runtime<R>(&self, f: impl FnOnce(&mut Runtime) -> R) -> Result<R, JsValue> {
        let out = {
            let mut runtime = self
                .runtime
                .try_borrow_mut()
                .map_err(|_| js_error("embed runtime is busy"))?;
            f(&mut runtime)
        };
        deliver_route_notices(&self.notices);
        Ok(out)
    }
}

#[wasm_bindgen]
impl EmbedHandle {
    /// Mount into `container`.
    ///
    /// `config_json` is a `RuntimeConfig` document. `analytics` receives each
    /// consented payload. Throws an `Error` whose `name` is a stable code
    /// (`trusted_content_enforced`, `invalid_config`, `host`).
    #[wasm_bindgen(constructor)]
    pub fn new(
        container: Element,
        config_json: &str,
        analytics: Function,
    ) -> Result<EmbedHandle, JsValue> {
        install_panic_hook();
        let config = parse_config(config_json).map_err(js_error)?;
        let window = web_sys::window().ok_or_else(|| js_error("no window"))?;
        let host = Rc::new(WindowHost::new(window, container.clone()));
        let trusted_types = WindowTrustedTypes::default();

        let runtime = EmbedRuntime::mount(
            Rc::clone(&host),
            &trusted_types,
            OwnershipRegistry::page(),
            config,
            move |event| match to_js(&event) {
                Ok(payload) => {
                    if let Err(err) = analytics.call1(&JsValue::NULL, &payload) {
                        tracing::warn!(error = %js_message(&err), "analytics transport threw");
                    }
                }
                Err(err) => tracing::warn!(error = %js_message(&err), "analytics payload not serializable"),
            },
        )
        .map_err(|err| {
            let error = js_sys::Error::new(&err.to_string());
            error.set_name(mount_error_code(&err));
            JsValue::from(error)
        })?;

        let runtime = Rc::new(RefCell::new(runtime));
        let weak = Rc::downgrade(&runtime);
        let notices = RouteNotices::default();
        let pending = notices.clone();
        host.set_sink(Box::new(move |kind, event| {
            dispatch_event(&weak, &pending, kind, event);
        }));

        Ok(EmbedHandle {
            runtime,
            container,
            trusted_types,
            route_listeners: HashMap::new(),
            next_route_listener: 1,
            notices,
        })
    }

    /// Current route as `{view, slug, pathname, href}`.
    pub fn route(&self) -> Result<JsValue, JsValue> {
        let view = self.with_runtime(|rt| RouteView::from(rt.router().current_route()))?;
        to_js(&view)
    }

    /// Navigate to an href or path. Returns the history write label.
    pub fn navigate(&self, href: &str, replace: bool) -> Result<String, JsValue> {
        self.with_runtime(|rt| {
            let write = rt
                .router_mut()
                .navigate(href, NavigateOptions { replace });
            write_label(write).to_owned()
        })
    }

    /// Encode `plan` into the address bar. Returns the history write label.
    pub fn set_plan(&self, plan: JsValue, replace: bool) -> Result<String, JsValue> {
        let plan = from_js_json(&plan)?;
        self.with_runtime(|rt| rt.router_mut().set_plan(&plan, SetPlanOptions { replace }))?
            .map(|write| write_label(write).to_owned())
            .map_err(|err| js_error(err.to_string()))
    }

    /// The plan in the address bar, or `undefined`.
    pub fn current_plan(&self) -> Result<JsValue, JsValue> {
        match self.with_runtime(|rt| rt.router().current_plan())? {
            Ok(Some(plan)) => to_js(&plan),
            Ok(None) => Ok(JsValue::UNDEFINED),
            Err(err) => Err(js_error(err.to_string())),
        }
    }

    /// Subscribe to route changes. The callback gets the new route.
    ///
    /// Callbacks run after the router has finished handling the change, so
    /// they may call `route`, `current_plan`, or `set_plan`.
    pub fn on_route_change(&mut self, callback: Function) -> Result<u32, JsValue> {
        let notices = self.notices.clone();
        let id = self.with_runtime(|rt| {
            rt.router().on_route_change(move |change| {
                notices.push((callback.clone(), RouteView::from(&change.current)));
            })
        })?;
        let handle = self.next_route_listener;
        self.next_route_listener += 1;
        self.route_listeners.insert(handle, id);
        Ok(handle)
    }

    pub fn off_route_change(&mut self, handle: u32) -> Result<bool, JsValue> {
        let Some(id) = self.route_listeners.remove(&handle) else {
            return Ok(false);
        };
        self.with_runtime(|rt| rt.router().off_route_change(id))
    }

    /// Sanitize `html` and insert it into the container.
    ///
    /// Returns whether the markup went through a trusted-types policy.
    pub fn render(&self, html: &str) -> Result<bool, JsValue> {
        let markup = self
            .with_runtime(|rt| rt.render_markup(html))?
            .map_err(|err| js_error(err.to_string()))?;
        let value = match (&markup, self.trusted_types.policy()) {
            (GuardedMarkup::Trusted(_), Some(policy)) => policy.create_html_value(markup.as_str())?,
            _ => JsValue::from_str(markup.as_str()),
        };
        Reflect::set(&self.container, &"innerHTML".into(), &value)?;
        Ok(markup.is_trusted())
    }

    /// Escape plain text for HTML insertion.
    pub fn escape_text(&self, text: &str) -> Result<String, JsValue> {
        self.with_runtime(|rt| rt.render_text(text))
    }

    /// Returns `delivered`, `buffered`, or `dropped`.
    pub fn track(&self, event: JsValue) -> Result<String, JsValue> {
        let event = from_js_json(&event)?;
        let outcome = self.with_runtime(|rt| rt.track(event))?;
        Ok(match outcome {
            Some(DispatchOutcome::Delivered) => "delivered",
            Some(DispatchOutcome::Buffered) => "buffered",
            None => "dropped",
        }
        .to_owned())
    }

    /// `source` is `user`, `host`, `config`, or any other label.
    pub fn grant_consent(&self, source: &str) -> Result<bool, JsValue> {
        let source = match source {
            "user" => ConsentSource::User,
            "host" => ConsentSource::Host,
            "config" => ConsentSource::Config,
            other => ConsentSource::Other(other.to_owned()),
        };
        self.with_runtime(|rt| rt.grant_consent(source))
    }

    pub fn revoke_consent(&self) -> Result<bool, JsValue> {
        self.with_runtime(|rt| rt.revoke_consent())
    }

    /// `pending` or `granted`.
    pub fn consent(&self) -> Result<String, JsValue> {
        self.with_runtime(|rt| match rt.consent() {
            ConsentState::Pending => "pending".to_owned(),
            ConsentState::Granted => "granted".to_owned(),
        })
    }

    /// Idempotent teardown. Returns `true` the first time.
    pub fn destroy(&mut self) -> Result<bool, JsValue> {
        self.route_listeners.clear();
        self.with_runtime(EmbedRuntime::destroy)
    }
}
