// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Signed option payloads for widget round-trips.
//!
//! A payload carries an option map through an untrusted client (link href,
//! hidden form field, query parameter) and back. Layout:
//!
//! ``BASE64URL(VERSION(1) || CBOR(options)) || "-" || HEX(HMAC-SHA256)``
//!
//! * the option map is plain data only (strings, numbers, booleans, null,
//!   nested maps and sequences); CBOR keeps it compact and deterministic since
//!   map keys are sorted.
//! * the digest is keyed with a server-only secret and computed over the raw
//!   body bytes, not over their base64 form.
//! * the digest is always 64 lowercase hex characters, so the payload is split
//!   on the *last* `-`; base64url may itself contain `-`.
//!
//! Decoding authenticates before it parses. Any failure up to and including the
//! digest comparison is reported as [`CodecError::Integrity`]; only an
//! authenticated body that turns out to be malformed is [`CodecError::Format`].
//!
//! Byte-stability is guaranteed for a given crate version only. Payloads are
//! single-page tokens; a version bump or secret rotation simply invalidates the
//! ones in flight.

use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64_ENGINE;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;

/// Option map carried by a payload.
pub type OptionMap = Map<String, Value>;

/// Body format version (first byte of the decoded body).
pub const FORMAT_VERSION: u8 = 0x01;
/// Length of the hex digest suffix.
pub const DIGEST_HEX_LEN: usize = 64;
/// Separator between body and digest.
pub const DELIMITER: char = '-';

const DOMAIN_TAG: &[u8] = b"WIDGEON-PAYLOADv1\x00";

type HmacSha256 = Hmac<Sha256>;

/// Errors produced while signing or verifying payloads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The payload could not be authenticated (tampered, truncated, or signed
    /// with a different secret).
    #[error("payload integrity check failed: {0}")]
    Integrity(&'static str),
    /// The payload was authentic but its body is not a usable option map.
    #[error("malformed payload: {0}")]
    Format(String),
    /// The option map could not be serialized.
    #[error("failed to encode options: {0}")]
    Encode(String),
    /// The signing secret was rejected.
    #[error("signing secret must not be empty")]
    InvalidKey,
}

impl CodecError {
    /// Returns `true` for authentication failures.
    pub fn is_integrity(&self) -> bool {
        matches!(self, CodecError::Integrity(_))
    }
}

/// Server-side signing secret. Never printed.
#[derive(Clone)]
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    /// Wrap a secret; empty secrets are rejected.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, CodecError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(CodecError::InvalidKey);
        }
        Ok(Self(secret.to_vec()))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

/// Encodes and verifies signed option payloads.
#[derive(Debug, Clone)]
pub struct PayloadCodec {
    key: SigningKey,
}

impl PayloadCodec {
    /// Build a codec around an existing key.
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Build a codec directly from secret bytes.
    pub fn from_secret(secret: impl AsRef<[u8]>) -> Result<Self, CodecError> {
        SigningKey::new(secret).map(Self::new)
    }

    /// Sign an arbitrary JSON value. Only maps are accepted.
    pub fn encode(&self, options: &Value) -> Result<String, CodecError> {
        let Value::Object(map) = options else {
            return Err(CodecError::Format(format!(
                "options must be a map, got {}",
                value_kind(options)
            )));
        };
        self.encode_map(map)
    }

    /// Sign an option map.
    pub fn encode_map(&self, options: &OptionMap) -> Result<String, CodecError> {
        let body = to_body(options)?;
        self.seal(&body)
    }

    /// Verify and decode a payload produced by [`encode`](Self::encode).
    pub fn decode(&self, payload: &str) -> Result<OptionMap, CodecError> {
        let (encoded, digest_hex) = split_payload(payload)?;
        let digest =
            hex::decode(digest_hex).map_err(|_| CodecError::Integrity("digest is not hex"))?;
        let body = BASE64_ENGINE
            .decode(encoded)
            .map_err(|_| CodecError::Integrity("body is not base64url"))?;
        self.verify(&body, &digest)?;
        from_body(&body)
    }

    fn mac(&self) -> Result<HmacSha256, CodecError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key.0).map_err(|_| CodecError::InvalidKey)?;
        mac.update(DOMAIN_TAG);
        Ok(mac)
    }

    fn seal(&self, body: &[u8]) -> Result<String, CodecError> {
        let mut mac = self.mac()?;
        mac.update(body);
        let tag = mac.finalize().into_bytes();
        Ok(format!(
            "{}{DELIMITER}{}",
            BASE64_ENGINE.encode(body),
            hex::encode(tag)
        ))
    }

    fn verify(&self, body: &[u8], digest: &[u8]) -> Result<(), CodecError> {
        let mut mac = self.mac()?;
        mac.update(body);
        // verify_slice compares in constant time.
        mac.verify_slice(digest)
            .map_err(|_| CodecError::Integrity("digest mismatch"))
    }
}

fn split_payload(payload: &str) -> Result<(&str, &str), CodecError> {
    let (encoded, digest) = payload
        .rsplit_once(DELIMITER)
        .ok_or(CodecError::Integrity("missing digest delimiter"))?;
    if digest.len() != DIGEST_HEX_LEN
        || !digest
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    {
        return Err(CodecError::Integrity(
            "digest is not fixed-width lowercase hex",
        ));
    }
    if encoded.is_empty() {
        return Err(CodecError::Integrity("empty body"));
    }
    Ok((encoded, digest))
}

fn to_body(options: &OptionMap) -> Result<Vec<u8>, CodecError> {
    let mut body = vec![FORMAT_VERSION];
    ciborium::ser::into_writer(options, &mut body)
        .map_err(|err| CodecError::Encode(err.to_string()))?;
    Ok(body)
}

fn from_body(body: &[u8]) -> Result<OptionMap, CodecError> {
    let Some((&version, cbor)) = body.split_first() else {
        return Err(CodecError::Format("empty body".into()));
    };
    if version != FORMAT_VERSION {
        return Err(CodecError::Format(format!(
            "unsupported payload version {version}"
        )));
    }
    let value: Value =
        ciborium::de::from_reader(cbor).map_err(|err| CodecError::Format(err.to_string()))?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(CodecError::Format(format!(
            "payload must be a map, got {}",
            value_kind(&other)
        ))),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "map",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codec() -> PayloadCodec {
        PayloadCodec::from_secret("test-secret").unwrap()
    }

    fn sample() -> OptionMap {
        json!({
            "widget_class": "hello_world",
            "widget_id": "default",
            "refresh": "default",
            "page": 3,
            "nested": { "tags": ["a", "b"], "flag": true }
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn decode_inverts_encode() {
        let c = codec();
        let payload = c.encode_map(&sample()).unwrap();
        assert_eq!(c.decode(&payload).unwrap(), sample());
    }

    #[test]
    fn encoding_is_deterministic() {
        let c = codec();
        assert_eq!(
            c.encode_map(&sample()).unwrap(),
            c.encode_map(&sample()).unwrap()
        );
    }

    #[test]
    fn payload_is_url_safe() {
        let payload = codec().encode_map(&sample()).unwrap();
        assert!(!payload.contains(['+', '/', '=', ' ']));
        let (_, digest) = payload.rsplit_once('-').unwrap();
        assert_eq!(digest.len(), DIGEST_HEX_LEN);
    }

    #[test]
    fn encode_rejects_non_map() {
        let err = codec().encode(&json!(["not", "a", "map"])).unwrap_err();
        assert!(matches!(err, CodecError::Format(_)));
        let err = codec().encode(&json!("text")).unwrap_err();
        assert!(matches!(err, CodecError::Format(_)));
    }

    #[test]
    fn every_mutated_byte_is_an_integrity_error() {
        let c = codec();
        let payload = c.encode_map(&sample()).unwrap();
        for idx in 0..payload.len() {
            let mut bytes = payload.clone().into_bytes();
            bytes[idx] = match bytes[idx] {
                b'a' => b'b',
                b'-' => b'A',
                _ => b'a',
            };
            let mutated = String::from_utf8(bytes).unwrap();
            let err = c.decode(&mutated).unwrap_err();
            assert!(err.is_integrity(), "byte {idx}: {err:?}");
        }
    }

    #[test]
    fn uppercase_digest_is_rejected() {
        let c = codec();
        let payload = c.encode_map(&sample()).unwrap();
        let (body, digest) = payload.rsplit_once('-').unwrap();
        let shouted = format!("{body}-{}", digest.to_ascii_uppercase());
        if shouted != payload {
            assert!(c.decode(&shouted).unwrap_err().is_integrity());
        }
    }

    #[test]
    fn truncated_payload_is_an_integrity_error() {
        let c = codec();
        let payload = c.encode_map(&sample()).unwrap();
        assert!(c.decode(&payload[..payload.len() - 1]).unwrap_err().is_integrity());
        assert!(c.decode(&payload[1..]).unwrap_err().is_integrity());
        assert!(c.decode("").unwrap_err().is_integrity());
    }

    #[test]
    fn changed_secret_is_an_integrity_error() {
        let payload = codec().encode_map(&sample()).unwrap();
        let other = PayloadCodec::from_secret("12345").unwrap();
        assert_eq!(
            other.decode(&payload).unwrap_err(),
            CodecError::Integrity("digest mismatch")
        );
    }

    #[test]
    fn authentic_non_map_is_a_format_error() {
        let c = codec();
        let mut body = vec![FORMAT_VERSION];
        ciborium::ser::into_writer(&json!([1, 2, 3]), &mut body).unwrap();
        let payload = c.seal(&body).unwrap();
        assert!(matches!(c.decode(&payload), Err(CodecError::Format(_))));
    }

    #[test]
    fn authentic_unknown_version_is_a_format_error() {
        let c = codec();
        let mut body = vec![0x7f];
        ciborium::ser::into_writer(&sample(), &mut body).unwrap();
        let payload = c.seal(&body).unwrap();
        assert!(matches!(c.decode(&payload), Err(CodecError::Format(_))));
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert_eq!(
            PayloadCodec::from_secret("").unwrap_err(),
            CodecError::InvalidKey
        );
    }

    #[test]
    fn key_debug_is_redacted() {
        let key = SigningKey::new("super-secret").unwrap();
        assert!(!format!("{key:?}").contains("super"));
    }
}
