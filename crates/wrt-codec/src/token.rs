#![forbid(unsafe_code)]

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::codec::CodecScheme;

/// Token length above which callers should store the plan remotely and
/// reference it by id instead of inlining it in the URL.
pub const DEFAULT_INLINE_THRESHOLD: usize = 1800;

/// An encoded plan token (`<tag>:<payload>` or legacy `<payload>`).
///
/// Any string is accepted at construction; validity is only checked by
/// [`PlanCodec::decode`](crate::PlanCodec::decode).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedPlan(String);

impl EncodedPlan {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Scheme named by the tag, `Legacy` for untagged tokens, `None` for an
    /// unknown tag.
    #[must_use]
    pub fn scheme(&self) -> Option<CodecScheme> {
        match self.0.split_once(':') {
            Some((tag, _)) => CodecScheme::from_tag(tag),
            None => Some(CodecScheme::Legacy),
        }
    }

    /// See [`should_inline`].
    #[must_use]
    pub fn should_inline(&self, threshold: usize) -> bool {
        should_inline(&self.0, threshold)
    }
}

impl fmt::Display for EncodedPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EncodedPlan {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl AsRef<str> for EncodedPlan {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<EncodedPlan> for String {
    fn from(plan: EncodedPlan) -> Self {
        plan.0
    }
}

/// Whether `token` is short enough to embed directly.
///
/// Pure length check; the inline-or-store policy belongs to the caller.
#[must_use]
pub fn should_inline(token: &str, threshold: usize) -> bool {
    token.len() <= threshold
}
