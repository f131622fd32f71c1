//! Webhook signature verification.
//!
//! The processor signs each delivery with HMAC-SHA256 over
//! `"{timestamp}.{payload}"` and sends the result in a header of the form
//! `t=1614556800,v1=5257a869e7...`. Verification recomputes the tag with the
//! shared signing secret and compares in constant time, and bounds the
//! timestamp to reject replayed deliveries.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Accept deliveries up to five minutes old.
const MAX_AGE_SECS: i64 = 300;
/// Tolerate small clock skew into the future.
const MAX_SKEW_SECS: i64 = 60;

/// Why a signature header failed verification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header is malformed")]
    MalformedHeader,
    #[error("signature timestamp outside the accepted window")]
    StaleTimestamp,
    #[error("signature mismatch")]
    Mismatch,
}

/// Verifies webhook signature headers against the signing secret.
pub struct WebhookVerifier {
    secret: SecretString,
}

impl WebhookVerifier {
    #[must_use]
    pub const fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Verify `header` against `payload` at the current time.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError`] if the header cannot be parsed, the
    /// timestamp is outside the replay window, or the tag does not match.
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), SignatureError> {
        self.verify_at(payload, header, chrono::Utc::now().timestamp())
    }

    /// Verify with an explicit notion of "now" (tests).
    pub fn verify_at(
        &self,
        payload: &[u8],
        header: &str,
        now: i64,
    ) -> Result<(), SignatureError> {
        let (timestamp, provided) = parse_header(header)?;

        let age = now - timestamp;
        if age > MAX_AGE_SECS || age < -MAX_SKEW_SECS {
            return Err(SignatureError::StaleTimestamp);
        }

        let expected = sign(self.secret.expose_secret().as_bytes(), timestamp, payload);
        if expected.ct_eq(&provided[..]).into() {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }
}

/// Compute the signature bytes for a timestamp and payload.
fn sign(secret: &[u8], timestamp: i64, payload: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length; new_from_slice cannot fail for SHA256.
    let mut mac = HmacSha256::new_from_slice(secret).unwrap_or_else(|_| {
        unreachable!("HMAC-SHA256 accepts any key length");
    });
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Build a signature header for a payload. Used by tests and the mock
/// transport to produce deliveries the verifier accepts.
#[must_use]
pub fn sign_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let tag = sign(secret.as_bytes(), timestamp, payload);
    format!("t={timestamp},v1={}", hex_encode(&tag))
}

/// Parse `t=...,v1=...` into (timestamp, signature bytes).
fn parse_header(header: &str) -> Result<(i64, Vec<u8>), SignatureError> {
    let mut timestamp = None;
    let mut signature = None;

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| SignatureError::MalformedHeader)?,
                );
            }
            "v1" => {
                signature = Some(hex_decode(value).ok_or(SignatureError::MalformedHeader)?);
            }
            // Unknown scheme versions are ignored.
            _ => {}
        }
    }

    match (timestamp, signature) {
        (Some(t), Some(s)) => Ok((t, s)),
        _ => Err(SignatureError::MalformedHeader),
    }
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

pub(crate) fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_8fK3mQ2vTz7LpR4x";

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SecretString::from(SECRET))
    }

    #[test]
    fn test_valid_signature_accepted() {
        let payload = br#"{"id":"evt_1"}"#;
        let now = 1_700_000_000;
        let header = sign_header(SECRET, now, payload);
        assert_eq!(verifier().verify_at(payload, &header, now), Ok(()));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let now = 1_700_000_000;
        let header = sign_header(SECRET, now, br#"{"id":"evt_1"}"#);
        assert_eq!(
            verifier().verify_at(br#"{"id":"evt_2"}"#, &header, now),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = b"payload";
        let now = 1_700_000_000;
        let header = sign_header("whsec_other_secret_0", now, payload);
        assert_eq!(
            verifier().verify_at(payload, &header, now),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = b"payload";
        let now = 1_700_000_000;
        let header = sign_header(SECRET, now - MAX_AGE_SECS - 1, payload);
        assert_eq!(
            verifier().verify_at(payload, &header, now),
            Err(SignatureError::StaleTimestamp)
        );
    }

    #[test]
    fn test_future_timestamp_within_skew_accepted() {
        let payload = b"payload";
        let now = 1_700_000_000;
        let header = sign_header(SECRET, now + 30, payload);
        assert_eq!(verifier().verify_at(payload, &header, now), Ok(()));

        let header = sign_header(SECRET, now + MAX_SKEW_SECS + 1, payload);
        assert_eq!(
            verifier().verify_at(payload, &header, now),
            Err(SignatureError::StaleTimestamp)
        );
    }

    #[test]
    fn test_malformed_headers_rejected() {
        let v = verifier();
        assert_eq!(
            v.verify_at(b"p", "no-equals-here", 0),
            Err(SignatureError::MalformedHeader)
        );
        assert_eq!(
            v.verify_at(b"p", "t=abc,v1=00", 0),
            Err(SignatureError::MalformedHeader)
        );
        assert_eq!(
            v.verify_at(b"p", "t=123", 0),
            Err(SignatureError::MalformedHeader)
        );
        assert_eq!(
            v.verify_at(b"p", "t=123,v1=zz", 0),
            Err(SignatureError::MalformedHeader)
        );
    }

    #[test]
    fn test_hex_roundtrip() {
        let bytes = [0x00, 0x7f, 0xff, 0x3a];
        assert_eq!(hex_encode(&bytes), "007fff3a");
        assert_eq!(hex_decode("007fff3a").unwrap(), bytes.to_vec());
        assert!(hex_decode("0").is_none());
    }
}
