//! Caller identity extraction.
//!
//! Subscription actions arrive from the storefront, which authenticates the
//! shopper and forwards their account id tagged with an HMAC-SHA256 over the
//! id, keyed by the shared session secret:
//!
//! ```text
//! Authorization: Bearer <user_id>:<hex hmac>
//! ```
//!
//! The tag only proves the id was vouched for by a holder of the secret; the
//! route handlers still check that the id owns the targeted subscription.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use artisan_roast_core::UserId;

use crate::error::EngineError;
use crate::processor::signature::{hex_decode, hex_encode};
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// The verified caller behind a subscription action request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserId);

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = EngineError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| EngineError::Unauthorized("missing authorization header".to_owned()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| EngineError::Unauthorized("expected bearer token".to_owned()))?;

        let secret = state.config().session_secret.expose_secret();
        let user_id = verify_tag(secret, token)
            .ok_or_else(|| EngineError::Unauthorized("invalid identity tag".to_owned()))?;
        Ok(Self(user_id))
    }
}

/// Check `<user_id>:<hex hmac>` and return the id when the tag matches.
fn verify_tag(secret: &str, token: &str) -> Option<UserId> {
    let (id_part, tag_part) = token.split_once(':')?;
    let id = id_part.parse::<i64>().ok()?;
    let provided = hex_decode(tag_part)?;
    let expected = tag_bytes(secret, id_part);
    if expected.ct_eq(&provided[..]).into() {
        Some(UserId::new(id))
    } else {
        None
    }
}

fn tag_bytes(secret: &str, id_part: &str) -> Vec<u8> {
    // HMAC accepts keys of any length; new_from_slice cannot fail for SHA256.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap_or_else(|_| {
        unreachable!("HMAC-SHA256 accepts any key length");
    });
    mac.update(id_part.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Build a bearer token for a user id. The storefront does the same when
/// forwarding an authenticated shopper's request.
#[must_use]
pub fn issue_tag(secret: &str, user_id: UserId) -> String {
    let id_part = user_id.as_i64().to_string();
    let tag = tag_bytes(secret, &id_part);
    format!("{id_part}:{}", hex_encode(&tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "sess_k9Dq2mXw4ZvN8rTe";

    #[test]
    fn test_issued_tag_verifies() {
        let token = issue_tag(SECRET, UserId::new(42));
        assert_eq!(verify_tag(SECRET, &token), Some(UserId::new(42)));
    }

    #[test]
    fn test_forged_id_rejected() {
        let token = issue_tag(SECRET, UserId::new(42));
        let tag = token.split_once(':').map(|(_, t)| t.to_owned());
        let forged = format!("43:{}", tag.unwrap_or_default());
        assert_eq!(verify_tag(SECRET, &forged), None);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_tag("sess_other_4ZvN8rTe", UserId::new(42));
        assert_eq!(verify_tag(SECRET, &token), None);
    }

    #[test]
    fn test_garbage_tokens_rejected() {
        assert_eq!(verify_tag(SECRET, "no-colon"), None);
        assert_eq!(verify_tag(SECRET, "abc:00ff"), None);
        assert_eq!(verify_tag(SECRET, "42:not-hex"), None);
    }
}
