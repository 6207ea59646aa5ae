#![forbid(unsafe_code)]

//! Plan codec: compact, URL-safe tokens for plan documents.
//!
//! A plan document is an opaque JSON tree. The codec turns it into a token
//! short enough to live in a query parameter and back again:
//!
//! ```text
//! <tag>:<base64url-no-padding(compressed JSON)>
//! ```
//!
//! | Tag | Scheme | Availability |
//! |-----|--------|--------------|
//! | `z` | zlib, maximum compression | feature `high-ratio` (default) |
//! | `b` | raw deflate | always |
//! | none | legacy raw base64url JSON | decode only, always |
//!
//! The token format is shared with the remote plan service and must stay
//! stable.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use wrt_codec::{decode, encode};
//!
//! let doc = json!({"blocks": [{"type": "hero", "title": "Summer Fest"}]});
//! let token = encode(&doc).unwrap();
//! assert_eq!(decode(token.as_str()).unwrap(), doc);
//! ```

mod codec;
mod error;
mod token;

pub use codec::{CodecScheme, MAX_DECODED_BYTES, PlanCodec, decode, encode};
pub use error::{CodecError, DecodeFailure};
pub use token::{DEFAULT_INLINE_THRESHOLD, EncodedPlan, should_inline};

/// Opaque widget content/state tree. The codec never inspects its shape.
pub type PlanDocument = serde_json::Value;
