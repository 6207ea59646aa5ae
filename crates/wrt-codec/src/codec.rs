#![forbid(unsafe_code)]

use std::io::{Read, Write};

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use flate2::Compression;
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, ZlibEncoder};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::PlanDocument;
use crate::error::{CodecError, DecodeFailure};
use crate::token::EncodedPlan;

/// Upper bound on decompressed plan size. Tokens that inflate past this are
/// rejected as corrupt rather than allocated.
pub const MAX_DECODED_BYTES: usize = 4 * 1024 * 1024;

/// URL-safe alphabet, no padding on encode, padding tolerated on decode.
const TOKEN_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Legacy tokens written by `btoa` used the standard alphabet.
const LEGACY_STANDARD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Compression scheme named by a token tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecScheme {
    /// `z`: zlib at maximum compression.
    HighRatio,
    /// `b`: raw deflate, always available.
    Fallback,
    /// Untagged raw JSON. Decode only.
    Legacy,
}

impl CodecScheme {
    /// Tag written before the colon, `None` for legacy tokens.
    #[must_use]
    pub const fn tag(self) -> Option<&'static str> {
        match self {
            Self::HighRatio => Some("z"),
            Self::Fallback => Some("b"),
            Self::Legacy => None,
        }
    }

    /// Scheme for a tag, `None` when the tag is unknown.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "z" => Some(Self::HighRatio),
            "b" => Some(Self::Fallback),
            _ => None,
        }
    }

    fn compress(self, json: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::HighRatio => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
                encoder.write_all(json).map_err(CodecError::Compress)?;
                encoder.finish().map_err(CodecError::Compress)
            }
            Self::Fallback => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(json).map_err(CodecError::Compress)?;
                encoder.finish().map_err(CodecError::Compress)
            }
            Self::Legacy => Ok(json.to_vec()),
        }
    }

    fn decompress(self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::HighRatio => read_bounded(ZlibDecoder::new(bytes)),
            Self::Fallback => read_bounded(DeflateDecoder::new(bytes)),
            Self::Legacy => Ok(bytes.to_vec()),
        }
    }
}

fn read_bounded(reader: impl Read) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    reader
        .take(MAX_DECODED_BYTES as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|err| CodecError::decode(DecodeFailure::Corrupt, err))?;
    if out.len() > MAX_DECODED_BYTES {
        return Err(CodecError::decode(
            DecodeFailure::TooLarge,
            format_args!("more than {MAX_DECODED_BYTES} bytes"),
        ));
    }
    Ok(out)
}

/// Encoder/decoder with an explicit set of available schemes.
///
/// [`PlanCodec::default`] enables the high-ratio scheme when the
/// `high-ratio` feature is compiled in. The fallback and legacy schemes are
/// always available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanCodec {
    high_ratio: bool,
}

impl Default for PlanCodec {
    fn default() -> Self {
        Self {
            high_ratio: cfg!(feature = "high-ratio"),
        }
    }
}

impl PlanCodec {
    /// A codec with the high-ratio scheme disabled, as on hosts where it
    /// cannot be loaded.
    #[must_use]
    pub const fn fallback_only() -> Self {
        Self { high_ratio: false }
    }

    /// Whether `scheme` can be used by this codec.
    #[must_use]
    pub const fn is_available(&self, scheme: CodecScheme) -> bool {
        match scheme {
            CodecScheme::HighRatio => self.high_ratio,
            CodecScheme::Fallback | CodecScheme::Legacy => true,
        }
    }

    /// Scheme used by [`encode`](Self::encode).
    #[must_use]
    pub const fn preferred_scheme(&self) -> CodecScheme {
        if self.high_ratio {
            CodecScheme::HighRatio
        } else {
            CodecScheme::Fallback
        }
    }

    /// Encode a plan document.
    ///
    /// Cannot fail for a `serde_json::Value`; the `Result` covers the
    /// in-memory compressor's I/O signature.
    pub fn encode(&self, doc: &PlanDocument) -> Result<EncodedPlan, CodecError> {
        self.encode_value(doc)
    }

    /// Encode any serialisable value as a plan token.
    pub fn encode_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<EncodedPlan, CodecError> {
        let json = serde_json::to_vec(value).map_err(CodecError::Serialize)?;
        let scheme = self.preferred_scheme();
        let compressed = scheme.compress(&json)?;
        let payload = TOKEN_ENGINE.encode(compressed);
        let tag = scheme.tag().unwrap_or_default();
        tracing::trace!(
            scheme = tag,
            json_bytes = json.len(),
            token_bytes = payload.len() + tag.len() + 1,
            "plan encoded"
        );
        Ok(EncodedPlan::new(format!("{tag}:{payload}")))
    }

    /// Decode a token into a plan document.
    ///
    /// Splits on the first colon; a token without one is a legacy payload.
    pub fn decode(&self, token: &str) -> Result<PlanDocument, CodecError> {
        self.decode_as(token)
    }

    /// Decode a token into any deserialisable type.
    pub fn decode_as<T: DeserializeOwned>(&self, token: &str) -> Result<T, CodecError> {
        let (scheme, payload) = match token.split_once(':') {
            Some((tag, payload)) => {
                let scheme = CodecScheme::from_tag(tag)
                    .filter(|scheme| self.is_available(*scheme))
                    .ok_or_else(|| CodecError::Unavailable {
                        tag: tag.to_owned(),
                    })?;
                (scheme, payload)
            }
            None => (CodecScheme::Legacy, token),
        };

        let bytes = decode_base64(scheme, payload)?;
        let json = scheme.decompress(&bytes)?;
        serde_json::from_slice(&json).map_err(|err| CodecError::decode(DecodeFailure::Json, err))
    }
}

fn decode_base64(scheme: CodecScheme, payload: &str) -> Result<Vec<u8>, CodecError> {
    match TOKEN_ENGINE.decode(payload) {
        Ok(bytes) => Ok(bytes),
        Err(err) if scheme == CodecScheme::Legacy => LEGACY_STANDARD_ENGINE
            .decode(payload)
            .map_err(|_| CodecError::decode(DecodeFailure::Base64, err)),
        Err(err) => Err(CodecError::decode(DecodeFailure::Base64, err)),
    }
}

/// Encode with the default codec.
pub fn encode(doc: &PlanDocument) -> Result<EncodedPlan, CodecError> {
    PlanCodec::default().encode(doc)
}

/// Decode with the default codec.
pub fn decode(token: &str) -> Result<PlanDocument, CodecError> {
    PlanCodec::default().decode(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> PlanDocument {
        json!({
            "title": "Block Party",
            "blocks": [
                {"type": "hero", "image": null, "tags": ["music", "food"]},
                {"type": "list", "items": [1, 2, 3], "compact": true}
            ]
        })
    }

    fn legacy_token(doc: &PlanDocument) -> String {
        TOKEN_ENGINE.encode(serde_json::to_vec(doc).unwrap())
    }

    #[test]
    fn default_codec_prefers_high_ratio() {
        let token = PlanCodec::default().encode(&sample()).unwrap();
        if cfg!(feature = "high-ratio") {
            assert!(token.as_str().starts_with("z:"));
        } else {
            assert!(token.as_str().starts_with("b:"));
        }
    }

    #[test]
    fn fallback_only_codec_writes_b_tag() {
        let codec = PlanCodec::fallback_only();
        let token = codec.encode(&sample()).unwrap();
        assert!(token.as_str().starts_with("b:"));
        assert_eq!(codec.decode(token.as_str()).unwrap(), sample());
    }

    #[test]
    fn payload_is_url_safe_without_padding() {
        let doc = json!({"text": "?&=/+".repeat(50)});
        let token = encode(&doc).unwrap();
        let (_, payload) = token.as_str().split_once(':').unwrap();
        assert!(
            payload
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        );
    }

    #[test]
    fn legacy_untagged_token_decodes() {
        let doc = sample();
        assert_eq!(decode(&legacy_token(&doc)).unwrap(), doc);
    }

    #[test]
    fn legacy_standard_alphabet_with_padding_decodes() {
        let doc = json!({"q": "a?b>c"});
        let token = base64::engine::general_purpose::STANDARD.encode(serde_json::to_vec(&doc).unwrap());
        assert_eq!(decode(&token).unwrap(), doc);
    }

    #[test]
    fn unknown_tag_is_unavailable() {
        let err = decode("q:AAAA").unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn high_ratio_token_without_support_is_unavailable() {
        let token = PlanCodec { high_ratio: true }.encode(&sample()).unwrap();
        let err = PlanCodec::fallback_only().decode(token.as_str()).unwrap_err();
        assert!(matches!(err, CodecError::Unavailable { ref tag } if tag == "z"));
    }

    #[test]
    fn malformed_base64_is_decode_error() {
        let err = decode("b:***").unwrap_err();
        assert_eq!(err.decode_failure(), Some(DecodeFailure::Base64));
    }

    #[test]
    fn corrupt_stream_is_decode_error() {
        let garbage = TOKEN_ENGINE.encode([0xFF, 0x00, 0x13, 0x37, 0x42]);
        let err = PlanCodec { high_ratio: true }
            .decode(&format!("z:{garbage}"))
            .unwrap_err();
        assert_eq!(err.decode_failure(), Some(DecodeFailure::Corrupt));
    }

    #[test]
    fn non_json_payload_is_decode_error() {
        let err = decode(&TOKEN_ENGINE.encode(b"not json")).unwrap_err();
        assert_eq!(err.decode_failure(), Some(DecodeFailure::Json));
    }

    #[test]
    fn oversized_stream_is_rejected() {
        let huge = vec![b' '; MAX_DECODED_BYTES + 10];
        let compressed = CodecScheme::Fallback.compress(&huge).unwrap();
        let token = format!("b:{}", TOKEN_ENGINE.encode(compressed));
        let err = decode(&token).unwrap_err();
        assert_eq!(err.decode_failure(), Some(DecodeFailure::TooLarge));
    }

    #[test]
    fn splits_on_first_colon_only() {
        let doc = json!({"url": "https://example.com:8080/a:b"});
        let token = PlanCodec::fallback_only().encode(&doc).unwrap();
        assert_eq!(token.as_str().matches(':').count(), 1);
        assert_eq!(decode(token.as_str()).unwrap(), doc);
    }

    #[test]
    fn compression_shrinks_repetitive_plans() {
        let doc = json!({"blocks": vec![json!({"type": "card", "title": "same"}); 40]});
        let raw = legacy_token(&doc);
        let token = encode(&doc).unwrap();
        assert!(token.len() < raw.len() / 4);
    }

    #[test]
    fn large_float_survives_exactly() {
        let x = f64::from_bits(6_874_053_252_593_983_126);
        let doc = json!({"x": x, "lat": 52.520_008, "lng": 13.404_954});
        let back = decode(encode(&doc).unwrap().as_str()).unwrap();
        assert_eq!(back["x"].as_f64().map(f64::to_bits), Some(x.to_bits()));
        assert_eq!(back, doc);
    }
}
