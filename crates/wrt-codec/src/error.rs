#![forbid(unsafe_code)]

use std::fmt;

/// Why a token could not be turned back into a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeFailure {
    /// Payload is not valid base64url.
    Base64,
    /// Compressed stream is truncated or corrupt.
    Corrupt,
    /// Decompressed output exceeds [`MAX_DECODED_BYTES`](crate::MAX_DECODED_BYTES).
    TooLarge,
    /// Decoded bytes are not a JSON document.
    Json,
}

impl fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Base64 => "malformed base64 payload",
            Self::Corrupt => "corrupt compressed stream",
            Self::TooLarge => "decoded plan exceeds size limit",
            Self::Json => "payload is not valid JSON",
        })
    }
}

/// Plan codec error.
///
/// Decode errors are unrecoverable locally: callers decide whether to show
/// fallback content or re-fetch the plan.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Token uses a scheme this build or runtime cannot decompress.
    #[error("plan codec `{tag}` is not available")]
    Unavailable { tag: String },
    /// Token is malformed or corrupt.
    #[error("failed to decode plan token: {failure} ({detail})")]
    Decode {
        failure: DecodeFailure,
        detail: String,
    },
    /// The value could not be serialised as JSON (non-string map keys, or a
    /// `Serialize` impl that reports an error).
    #[error("failed to serialize plan document: {0}")]
    Serialize(#[source] serde_json::Error),
    /// Compressor failed while writing to memory.
    #[error("failed to compress plan document: {0}")]
    Compress(#[source] std::io::Error),
}

impl CodecError {
    pub(crate) fn decode(failure: DecodeFailure, detail: impl fmt::Display) -> Self {
        Self::Decode {
            failure,
            detail: detail.to_string(),
        }
    }

    /// The decode failure category, if this is a decode error.
    #[must_use]
    pub fn decode_failure(&self) -> Option<DecodeFailure> {
        match self {
            Self::Decode { failure, .. } => Some(*failure),
            _ => None,
        }
    }

    /// Whether this is a `CodecUnavailable` condition.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}
