#![forbid(unsafe_code)]

//! Request/response types and the transport seam.

use std::fmt;

use url::Url;
use web_time::Duration;

use crate::abort::AbortReason;

/// HTTP method. Only what the plan service needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    /// Safe to repeat: eligible for retries.
    #[must_use]
    pub const fn is_idempotent(self) -> bool {
        matches!(self, Self::Get)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    /// JSON body.
    pub body: Option<String>,
    /// Per-attempt timeout; filled in from the abort signal's deadline.
    pub timeout: Option<Duration>,
}

impl Request {
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            body: None,
            timeout: None,
        }
    }

    #[must_use]
    pub fn post_json(url: Url, body: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url,
            body: Some(body.into()),
            timeout: None,
        }
    }
}

/// A completed exchange, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Network failures surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetError {
    #[error("request {0}")]
    Aborted(AbortReason),
    /// Non-success status after all permitted attempts.
    #[error("HTTP {status} after {attempts} attempt(s)")]
    Status { status: u16, attempts: u32 },
    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// The response body was not what the service promised.
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Sends one request. Implementations never retry.
pub trait Transport {
    /// Non-success statuses are returned as `Ok`; `Err` means no response.
    fn send(&self, request: &Request) -> Result<Response, NetError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &Request) -> Result<Response, NetError> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for std::rc::Rc<T> {
    fn send(&self, request: &Request) -> Result<Response, NetError> {
        (**self).send(request)
    }
}

/// Blocking `reqwest` transport for native hosts.
#[cfg(all(feature = "reqwest", not(target_arch = "wasm32")))]
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

#[cfg(all(feature = "reqwest", not(target_arch = "wasm32")))]
impl ReqwestTransport {
    #[must_use]
    pub fn new(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

#[cfg(all(feature = "reqwest", not(target_arch = "wasm32")))]
impl Transport for ReqwestTransport {
    fn send(&self, request: &Request) -> Result<Response, NetError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(request.url.clone()),
            Method::Post => self.client.post(request.url.clone()),
        };
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = &request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }
        let response = builder.send().map_err(|err| {
            if err.is_timeout() {
                NetError::Aborted(AbortReason::Timeout)
            } else {
                NetError::Transport(err.to_string())
            }
        })?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| NetError::Decode(err.to_string()))?;
        Ok(Response { status, body })
    }
}
