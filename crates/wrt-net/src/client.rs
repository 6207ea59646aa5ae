#![forbid(unsafe_code)]

//! Client for the remote plan store.
//!
//! The store keeps encoded plans that are too long for an address bar and
//! hands back a short id. Wire format (JSON):
//!
//! ```text
//! POST {base}/plans        {"plan": "<token>"}  ->  {"id": "<id>"}
//! GET  {base}/plans/{id}                        ->  {"plan": "<token>"}
//! ```
//!
//! Saves are never retried; loads follow the client's [`RetryPolicy`]. Every
//! call combines the caller's signal with a per-call timeout.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use url::Url;
use web_time::Duration;
use wrt_codec::{DEFAULT_INLINE_THRESHOLD, EncodedPlan};

use crate::abort::AbortSignal;
use crate::fetch::fetch_with_retry;
use crate::retry::RetryPolicy;
use crate::transport::{NetError, Request, Response, Transport};

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How a plan is referenced from the address bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanReference {
    /// Short enough to embed directly.
    Inline(EncodedPlan),
    /// Persisted; the address bar carries the id.
    Stored { id: String },
}

#[derive(Serialize)]
struct SaveBody<'a> {
    plan: &'a str,
}

#[derive(Deserialize)]
struct SaveReply {
    id: String,
}

#[derive(Deserialize)]
struct LoadReply {
    plan: EncodedPlan,
}

type Sleeper = Rc<dyn Fn(Duration)>;

/// Plan-store client over any [`Transport`].
pub struct PlanStoreClient<T> {
    transport: T,
    base: Url,
    policy: RetryPolicy,
    timeout: Duration,
    inline_threshold: usize,
    sleeper: Sleeper,
}

impl<T> fmt::Debug for PlanStoreClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanStoreClient")
            .field("base", &self.base.as_str())
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .field("inline_threshold", &self.inline_threshold)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> PlanStoreClient<T> {
    /// Client for the store rooted at `base`.
    ///
    /// Backoff uses a thread sleep on native targets. Browser hosts must
    /// supply a timer-backed sleeper via [`with_sleeper`](Self::with_sleeper).
    pub fn new(transport: T, base: Url) -> Self {
        Self {
            transport,
            base,
            policy: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
            sleeper: Rc::new(default_sleep),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_inline_threshold(mut self, threshold: usize) -> Self {
        self.inline_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + 'static) -> Self {
        self.sleeper = Rc::new(sleeper);
        self
    }

    /// Persist `plan`, returning its id. Single attempt.
    pub fn save_plan(&self, plan: &EncodedPlan, signal: &AbortSignal) -> Result<String, NetError> {
        let url = self.base.join("plans")?;
        let body = serde_json::to_string(&SaveBody {
            plan: plan.as_str(),
        })
        .map_err(|err| NetError::Decode(err.to_string()))?;
        let response = self.call(&Request::post_json(url, body), signal)?;
        let reply: SaveReply =
            serde_json::from_str(&response.body).map_err(|err| NetError::Decode(err.to_string()))?;
        tracing::debug!(id = %reply.id, len = plan.len(), "plan stored");
        Ok(reply.id)
    }

    /// Fetch the plan stored under `id`. Retried per policy.
    pub fn load_plan(&self, id: &str, signal: &AbortSignal) -> Result<EncodedPlan, NetError> {
        let mut url = self.base.join("plans/")?;
        url.path_segments_mut()
            .map_err(|()| NetError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push(id);
        let response = self.call(&Request::get(url), signal)?;
        let reply: LoadReply =
            serde_json::from_str(&response.body).map_err(|err| NetError::Decode(err.to_string()))?;
        Ok(reply.plan)
    }

    /// Inline `plan` when short enough, otherwise store it.
    pub fn plan_reference(
        &self,
        plan: EncodedPlan,
        signal: &AbortSignal,
    ) -> Result<PlanReference, NetError> {
        if plan.should_inline(self.inline_threshold) {
            return Ok(PlanReference::Inline(plan));
        }
        let id = self.save_plan(&plan, signal)?;
        Ok(PlanReference::Stored { id })
    }

    fn call(&self, request: &Request, signal: &AbortSignal) -> Result<Response, NetError> {
        let combined = AbortSignal::any([signal.clone(), AbortSignal::timeout(self.timeout)]);
        let sleeper = Rc::clone(&self.sleeper);
        fetch_with_retry(&self.transport, request, &self.policy, &combined, |delay| {
            sleeper(delay);
        })
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn default_sleep(delay: Duration) {
    std::thread::sleep(delay);
}

#[cfg(target_arch = "wasm32")]
fn default_sleep(_delay: Duration) {}
