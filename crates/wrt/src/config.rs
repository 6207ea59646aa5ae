#![forbid(unsafe_code)]

//! Runtime configuration as data.
//!
//! One [`RuntimeConfig`] describes a whole embed: routing, analytics
//! buffering, plan inlining, the plan store, and the trusted-types policy
//! name. Every field has a default, so partial documents load.
//!
//! ```toml
//! trusted_policy_name = "acme-events"
//!
//! [router]
//! embed_id = "summer-lineup"
//! history_mode = "path"
//! route_takeover = "document"
//! base_path = "/festival"
//!
//! [buffer]
//! max_items = 50
//!
//! [network]
//! plan_store_url = "https://plans.example/api/"
//! timeout_ms = 5000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;
use web_time::Duration;
use wrt_codec::DEFAULT_INLINE_THRESHOLD;
use wrt_events::{BufferLimits, ConsentState};
use wrt_guard::DEFAULT_POLICY_NAME;
use wrt_net::{DEFAULT_TIMEOUT, PlanStoreClient, RetryPolicy, Transport};
use wrt_router::RouterOptions;

/// Plan-store connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Base URL of the plan store. `None` keeps every plan inline.
    pub plan_store_url: Option<String>,
    /// Per-call timeout in milliseconds.
    pub timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            plan_store_url: None,
            timeout_ms: u64::try_from(DEFAULT_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
            retry: RetryPolicy::default(),
        }
    }
}

impl NetworkConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// A plan-store client over `transport`, or `None` without a store URL.
    pub fn plan_store<T: Transport>(
        &self,
        transport: T,
        inline_threshold: usize,
    ) -> Result<Option<PlanStoreClient<T>>, url::ParseError> {
        let Some(raw) = &self.plan_store_url else {
            return Ok(None);
        };
        let client = PlanStoreClient::new(transport, Url::parse(raw)?)
            .with_policy(self.retry.clone())
            .with_timeout(self.timeout())
            .with_inline_threshold(inline_threshold);
        Ok(Some(client))
    }
}

/// Configuration for one embed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub router: RouterOptions,
    /// Analytics backlog limits while consent is pending.
    pub buffer: BufferLimits,
    /// Longest plan token kept in the address bar.
    pub inline_threshold: usize,
    pub network: NetworkConfig,
    pub trusted_policy_name: String,
    /// Consent at mount. Anything but `pending` must come from the host's
    /// own consent records.
    pub consent: ConsentState,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            router: RouterOptions::default(),
            buffer: BufferLimits::default(),
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
            network: NetworkConfig::default(),
            trusted_policy_name: DEFAULT_POLICY_NAME.to_owned(),
            consent: ConsentState::Pending,
        }
    }
}

impl RuntimeConfig {
    /// Defaults with the given embed id.
    #[must_use]
    pub fn for_embed(embed_id: impl Into<String>) -> Self {
        Self {
            router: RouterOptions::new(embed_id),
            ..Self::default()
        }
    }

    /// Load from a TOML string.
    #[cfg(feature = "toml-config")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(ConfigError::Toml)
    }

    /// Load from a TOML file on disk.
    #[cfg(feature = "toml-config")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(ConfigError::Json)
    }

    /// Load from a JSON file on disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Problems that would make the embed misbehave. Empty means valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.router.embed_id.trim().is_empty() {
            errors.push("router.embed_id must not be empty".into());
        }
        let templates = self.router.templates();
        if !templates.detail_has_slug() {
            errors.push(format!(
                "router detail template must contain :slug, got {:?}",
                templates.detail
            ));
        }
        if templates.detail == templates.list {
            errors.push("router list and detail templates must differ".into());
        }
        if self.buffer.max_items == 0 {
            errors.push("buffer.max_items must be > 0".into());
        }
        if self.buffer.max_bytes == 0 {
            errors.push("buffer.max_bytes must be > 0".into());
        }
        if self.inline_threshold == 0 {
            errors.push("inline_threshold must be > 0".into());
        }
        if self.trusted_policy_name.trim().is_empty() {
            errors.push("trusted_policy_name must not be empty".into());
        }
        if self.network.timeout_ms == 0 {
            errors.push("network.timeout_ms must be > 0".into());
        }
        if let Some(raw) = &self.network.plan_store_url {
            match Url::parse(raw) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(url) => errors.push(format!(
                    "network.plan_store_url must be http(s), got {:?}",
                    url.scheme()
                )),
                Err(err) => errors.push(format!("network.plan_store_url is invalid: {err}")),
            }
        }

        errors
    }

    /// [`validate`](Self::validate) as a `Result`.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Errors from loading a [`RuntimeConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "toml-config")]
    #[error("TOML parse error: {0}")]
    Toml(#[source] toml::de::Error),
    #[error("JSON parse error: {0}")]
    Json(#[source] serde_json::Error),
    #[error("validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wrt_router::{HistoryMode, RouteTakeover};

    #[test]
    fn defaults_are_valid_once_named() {
        assert_eq!(
            RuntimeConfig::default().validate(),
            vec!["router.embed_id must not be empty".to_owned()]
        );
        assert!(RuntimeConfig::for_embed("lineup").validate().is_empty());
    }

    #[test]
    fn json_partial_document() {
        let config = RuntimeConfig::from_json_str(
            r#"{"router": {"embed_id": "e1", "history_mode": "hash"}, "buffer": {"max_items": 5}}"#,
        )
        .unwrap();
        assert_eq!(config.router.history_mode, HistoryMode::Hash);
        assert_eq!(config.buffer.max_items, 5);
        assert_eq!(config.buffer.max_bytes, BufferLimits::default().max_bytes);
        assert_eq!(config.inline_threshold, DEFAULT_INLINE_THRESHOLD);
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn toml_document() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            trusted_policy_name = "acme"
            consent = "granted"

            [router]
            embed_id = "lineup"
            history_mode = "path"
            route_takeover = "document"
            base_path = "/festival"

            [network]
            plan_store_url = "https://plans.example/api/"
            timeout_ms = 2500
            "#,
        )
        .unwrap();
        assert_eq!(config.router.route_takeover, RouteTakeover::Document);
        assert_eq!(config.router.templates().detail, "/festival/:slug");
        assert_eq!(config.consent, ConsentState::Granted);
        assert_eq!(config.network.timeout(), Duration::from_millis(2500));
        assert!(config.validate().is_empty());
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut config = RuntimeConfig::for_embed("x");
        config.buffer = BufferLimits::new(0, 0);
        config.router.route_templates = Some(wrt_router::RouteTemplateOverrides {
            list: None,
            detail: Some("/events/detail".into()),
        });
        config.network.plan_store_url = Some("ftp://plans.example".into());
        let errors = config.validate();
        assert_eq!(errors.len(), 4, "{errors:?}");
        assert!(matches!(
            RuntimeConfig::default().validated(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn plan_store_follows_network_section() {
        struct Unused;
        impl Transport for Unused {
            fn send(&self, _: &wrt_net::Request) -> Result<wrt_net::Response, wrt_net::NetError> {
                unreachable!()
            }
        }

        let mut network = NetworkConfig::default();
        assert!(network.plan_store(Unused, 10).unwrap().is_none());
        network.plan_store_url = Some("https://plans.example/api/".into());
        assert!(network.plan_store(Unused, 10).unwrap().is_some());
        network.plan_store_url = Some("not a url".into());
        assert!(network.plan_store(Unused, 10).is_err());
    }

    #[test]
    fn bad_json_is_reported() {
        let err = RuntimeConfig::from_json_str("{").unwrap_err();
        assert!(err.to_string().starts_with("JSON parse error"));
    }
}
