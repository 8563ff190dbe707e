//! Session management
//!
//! The provider session is stored in a cookie as URL-safe base64 of its
//! JSON, followed by an HMAC-SHA256 signature over that payload. The
//! application never keeps sessions server-side.

use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::provider::User;

/// Refresh sessions that expire within this many seconds
pub const EXPIRY_MARGIN_SECS: i64 = 10;

/// Lifetime assumed when the provider omits `expires_in`
pub const DEFAULT_SESSION_LIFETIME_SECS: i64 = 3600;

type HmacSha256 = Hmac<Sha256>;

/// Session cookie encoding failure
#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    #[error("session serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid signing key: {0}")]
    Key(String),
}

/// Provider session
///
/// Opaque token pair plus the identity it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Unix timestamp (seconds) at which the access token expires
    pub expires_at: i64,
    pub user: User,
}

impl Session {
    /// Check if the access token is expired or about to be
    pub fn expires_soon(&self) -> bool {
        self.expires_at.saturating_sub(EXPIRY_MARGIN_SECS) <= Utc::now().timestamp()
    }

    /// Seconds until expiry, never negative
    pub fn expires_in(&self) -> i64 {
        self.expires_at
            .saturating_sub(Utc::now().timestamp())
            .max(0)
    }
}

/// Token endpoint payload as returned by the provider
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

impl From<TokenResponse> for Session {
    fn from(response: TokenResponse) -> Self {
        let expires_at = response.expires_at.unwrap_or_else(|| {
            Utc::now().timestamp()
                + response
                    .expires_in
                    .unwrap_or(DEFAULT_SESSION_LIFETIME_SECS)
        });

        Session {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            token_type: response.token_type.unwrap_or_else(|| "bearer".to_string()),
            expires_at,
            user: response.user,
        }
    }
}

fn signer(secret: &str) -> Result<HmacSha256, CookieError> {
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| CookieError::Key(e.to_string()))
}

/// Encode a session into a signed cookie value
///
/// Format: `base64(json).base64(hmac_sha256(base64(json)))`
pub fn encode_session_cookie(session: &Session, secret: &str) -> Result<String, CookieError> {
    let payload = general_purpose::URL_SAFE_NO_PAD.encode(serde_json::to_vec(session)?);

    let mut mac = signer(secret)?;
    mac.update(payload.as_bytes());
    let signature = general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{payload}.{signature}"))
}

/// Verify and decode a session cookie value
///
/// Returns `None` for anything that is not a session we wrote, including
/// values whose signature does not match `secret`.
pub fn decode_session_cookie(value: &str, secret: &str) -> Option<Session> {
    let (payload, signature) = value.split_once('.')?;
    let signature = general_purpose::URL_SAFE_NO_PAD.decode(signature).ok()?;

    let mut mac = signer(secret).ok()?;
    mac.update(payload.as_bytes());
    mac.verify_slice(&signature).ok()?;

    let payload = general_purpose::URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&payload).ok()
}

/// Read the `exp` claim of a JWT access token without verifying it
///
/// Verification is the provider's job; the claim only decides whether a
/// restored token needs refreshing first.
pub fn jwt_expiry(token: &str) -> Option<i64> {
    #[derive(Deserialize)]
    struct Claims {
        exp: i64,
    }

    let mut parts = token.split('.');
    let (_header, payload) = (parts.next()?, parts.next()?);
    parts.next()?;

    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice::<Claims>(&bytes)
        .ok()
        .map(|claims| claims.exp)
}

/// Generate a PKCE code verifier (RFC 7636, 43+ unreserved characters)
pub fn generate_code_verifier() -> String {
    use rand::RngCore;

    let mut bytes = [0u8; 48];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// S256 challenge for a PKCE verifier
pub fn code_challenge(verifier: &str) -> String {
    use sha2::{Digest, Sha256};

    let digest = Sha256::digest(verifier.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::provider::UserMetadata;

    fn session(expires_at: i64) -> Session {
        Session {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            token_type: "bearer".to_string(),
            expires_at,
            user: User {
                id: "user-1".to_string(),
                email: Some("user@example.com".to_string()),
                user_metadata: UserMetadata {
                    full_name: Some("Quiz Master".to_string()),
                    ..Default::default()
                },
            },
        }
    }

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn cookie_value_decodes_to_same_session() {
        let original = session(Utc::now().timestamp() + 3600);
        let value = encode_session_cookie(&original, SECRET).unwrap();

        assert!(!value.contains('='));
        assert_eq!(decode_session_cookie(&value, SECRET), Some(original));
    }

    #[test]
    fn garbage_cookie_is_ignored() {
        assert_eq!(decode_session_cookie("not base64 at all!", SECRET), None);
        assert_eq!(
            decode_session_cookie(&general_purpose::URL_SAFE_NO_PAD.encode(b"{}"), SECRET),
            None
        );
    }

    #[test]
    fn unsigned_cookie_is_rejected() {
        let payload = general_purpose::URL_SAFE_NO_PAD
            .encode(serde_json::to_vec(&session(4_000_000_000)).unwrap());

        assert_eq!(decode_session_cookie(&payload, SECRET), None);
        assert_eq!(decode_session_cookie(&format!("{payload}.c2lnbmF0dXJl"), SECRET), None);
    }

    #[test]
    fn cookie_signed_with_other_secret_is_rejected() {
        let value = encode_session_cookie(&session(4_000_000_000), "another-secret").unwrap();
        assert_eq!(decode_session_cookie(&value, SECRET), None);
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let value = encode_session_cookie(&session(4_000_000_000), SECRET).unwrap();
        let (_, signature) = value.split_once('.').unwrap();

        let mut forged = session(4_000_000_000);
        forged.user.id = "someone-else".to_string();
        let payload = general_purpose::URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());

        assert_eq!(decode_session_cookie(&format!("{payload}.{signature}"), SECRET), None);
    }

    #[test]
    fn expiry_margin_is_applied() {
        let now = Utc::now().timestamp();
        assert!(session(now - 1).expires_soon());
        assert!(session(now + EXPIRY_MARGIN_SECS - 1).expires_soon());
        assert!(!session(now + 3600).expires_soon());
        assert_eq!(session(now - 100).expires_in(), 0);
    }

    #[test]
    fn extreme_expiry_values_do_not_overflow() {
        assert!(session(i64::MIN).expires_soon());
        assert_eq!(session(i64::MIN).expires_in(), 0);
        assert!(!session(i64::MAX).expires_soon());
        assert!(session(i64::MAX).expires_in() > 0);
    }

    #[test]
    fn jwt_expiry_reads_exp_claim() {
        let payload = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"sub":"u","exp":1700000000}"#);
        let token = format!("eyJhbGciOiJIUzI1NiJ9.{payload}.signature");

        assert_eq!(jwt_expiry(&token), Some(1_700_000_000));
        assert_eq!(jwt_expiry("opaque-token"), None);
        assert_eq!(jwt_expiry("a.b"), None);
    }

    #[test]
    fn code_challenge_matches_rfc_7636_example() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            code_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn code_verifier_is_long_enough() {
        let verifier = generate_code_verifier();
        assert_eq!(verifier.len(), 64);
        assert_ne!(verifier, generate_code_verifier());
    }

    #[test]
    fn token_response_without_expires_at_uses_expires_in() {
        let response: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "a",
            "refresh_token": "r",
            "expires_in": 120,
            "user": {"id": "u"}
        }))
        .unwrap();

        let session = Session::from(response);
        assert_eq!(session.token_type, "bearer");
        assert!((118..=120).contains(&session.expires_in()));
        assert_eq!(session.user.email, None);
    }
}
