//! Stateless session tokens signed with HMAC-SHA256.
//!
//! ## Token Format
//!
//! Tokens are composed of:
//! - 8 bytes: user id (big-endian)
//! - 8 bytes: expiry (Unix seconds, big-endian)
//! - 32 bytes: HMAC-SHA256 signature over the first 16 bytes
//!
//! Total: 48 bytes, base64-url encoded for transport. A token is
//! self-contained — verification recomputes the signature and checks the
//! embedded expiry; no session record is kept server-side, and there is no
//! early-revocation mechanism (tokens simply expire).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

use crate::error::ServiceError;

type HmacSha256 = Hmac<Sha256>;

const CLAIMS_LEN: usize = 16;
const TOKEN_LEN: usize = 48;

/// Issues and verifies bearer tokens. The signing key and lifetime are
/// injected at construction so each instance (and each test) can use its own.
#[derive(Clone)]
pub struct SessionAuthenticator {
    secret: Vec<u8>,
    ttl: Duration,
}

impl SessionAuthenticator {
    pub fn new(secret: Vec<u8>, ttl: Duration) -> Self {
        Self { secret, ttl }
    }

    /// Create a signed token asserting "bearer is `user_id`" until now + ttl.
    pub fn issue(&self, user_id: i64) -> String {
        let expires_at = Utc::now().timestamp() + self.ttl.as_secs() as i64;

        let mut data = Vec::with_capacity(TOKEN_LEN);
        data.extend_from_slice(&user_id.to_be_bytes());
        data.extend_from_slice(&expires_at.to_be_bytes());

        let signature = self.sign(&data);
        data.extend_from_slice(&signature);

        URL_SAFE_NO_PAD.encode(data)
    }

    /// Validate a token and return the user id it asserts.
    ///
    /// Fails with `InvalidToken` when the encoding or length is wrong, the
    /// signature does not match, the user id claim is absent, or the token
    /// is expired. The signature is checked before any claim is trusted.
    pub fn verify(&self, token: &str) -> Result<i64, ServiceError> {
        let raw = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| ServiceError::InvalidToken)?;
        if raw.len() != TOKEN_LEN {
            return Err(ServiceError::InvalidToken);
        }

        // Constant-time comparison via the Mac trait
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC can take key of any size");
        mac.update(&raw[0..CLAIMS_LEN]);
        mac.verify_slice(&raw[CLAIMS_LEN..])
            .map_err(|_| ServiceError::InvalidToken)?;

        let user_id = i64::from_be_bytes(raw[0..8].try_into().unwrap());
        let expires_at = i64::from_be_bytes(raw[8..16].try_into().unwrap());

        if user_id <= 0 {
            return Err(ServiceError::InvalidToken);
        }
        if Utc::now().timestamp() >= expires_at {
            return Err(ServiceError::InvalidToken);
        }

        Ok(user_id)
    }

    /// Signs data with HMAC-SHA256.
    fn sign(&self, data: &[u8]) -> [u8; 32] {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC can take key of any size");
        mac.update(data);
        mac.finalize().into_bytes().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator(ttl_secs: u64) -> SessionAuthenticator {
        SessionAuthenticator::new(
            b"test-secret-key-32-bytes-long!!".to_vec(),
            Duration::from_secs(ttl_secs),
        )
    }

    #[test]
    fn issue_and_verify_roundtrip() {
        let auth = authenticator(1800);
        let token = auth.issue(42);
        assert_eq!(auth.verify(&token).unwrap(), 42);
    }

    #[test]
    fn reject_wrong_key() {
        let auth = authenticator(1800);
        let other = SessionAuthenticator::new(b"another-key".to_vec(), Duration::from_secs(1800));

        let token = auth.issue(42);
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn reject_tampered_token() {
        let auth = authenticator(1800);
        let token = auth.issue(42);

        let mut raw = URL_SAFE_NO_PAD.decode(&token).unwrap();
        raw[3] ^= 0xFF; // flip a bit in the user id claim
        let tampered = URL_SAFE_NO_PAD.encode(raw);

        assert!(auth.verify(&tampered).is_err());
    }

    #[test]
    fn reject_expired_token() {
        let auth = authenticator(0);
        let token = auth.issue(42);
        assert!(auth.verify(&token).is_err());
    }

    #[test]
    fn accept_until_expiry() {
        // A long-lived token never fails before its window closes
        let auth = authenticator(3600);
        let token = auth.issue(7);
        assert!(auth.verify(&token).is_ok());
    }

    #[test]
    fn reject_truncated_token() {
        let auth = authenticator(1800);
        let token = auth.issue(42);
        assert!(auth.verify(&token[0..token.len() - 4]).is_err());
    }

    #[test]
    fn reject_garbage() {
        let auth = authenticator(1800);
        assert!(auth.verify("not-a-token").is_err());
        assert!(auth.verify("").is_err());
    }

    #[test]
    fn reject_absent_user_claim() {
        let auth = authenticator(1800);
        // A zero user id is never issued; a forged-zero claim must not verify
        let token = auth.issue(0);
        assert!(auth.verify(&token).is_err());
    }
}
