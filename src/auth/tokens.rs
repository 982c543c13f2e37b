//! HS256 access tokens

use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use uuid::Uuid;

use super::Claims;
use crate::domain::Role;

/// Signing and verification keys, shared through `AppState`
#[derive(Clone)]
pub struct JwtKeys {
    inner: Arc<JwtKeysInner>,
}

struct JwtKeysInner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl_seconds: i64,
}

impl JwtKeys {
    pub fn new(secret: &str, issuer: &str, ttl_hours: i64) -> Self {
        Self {
            inner: Arc::new(JwtKeysInner {
                encoding: EncodingKey::from_secret(secret.as_bytes()),
                decoding: DecodingKey::from_secret(secret.as_bytes()),
                issuer: issuer.to_string(),
                ttl_seconds: ttl_hours * 3600,
            }),
        }
    }

    /// Token lifetime in seconds
    pub fn ttl_seconds(&self) -> i64 {
        self.inner.ttl_seconds
    }

    pub fn issue(&self, user_id: Uuid, role: Role, email: &str) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            email: email.to_string(),
            iss: self.inner.issuer.clone(),
            iat: now,
            exp: now + self.inner.ttl_seconds,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.inner.encoding)
            .context("Failed to sign access token")
    }

    /// Verify signature, issuer and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.inner.issuer]);
        validation.validate_exp = true;
        validation.leeway = 30;

        let data = decode::<Claims>(token, &self.inner.decoding, &validation)
            .context("JWT validation failed")?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-long-enough-for-hmac";

    #[test]
    fn issued_tokens_verify() {
        let keys = JwtKeys::new(SECRET, "interiorquote", 24);
        let id = Uuid::new_v4();
        let token = keys.issue(id, Role::Customer, "ravi@example.com").unwrap();

        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, id.to_string());
        assert_eq!(claims.role, Role::Customer);
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let issuer = JwtKeys::new(SECRET, "interiorquote", 1);
        let other = JwtKeys::new("another-secret-that-is-long-enough!!", "interiorquote", 1);
        let token = issuer.issue(Uuid::new_v4(), Role::Seller, "s@example.com").unwrap();
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let a = JwtKeys::new(SECRET, "interiorquote", 1);
        let b = JwtKeys::new(SECRET, "someone-else", 1);
        let token = a.issue(Uuid::new_v4(), Role::Designer, "d@example.com").unwrap();
        assert!(b.verify(&token).is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let keys = JwtKeys::new(SECRET, "interiorquote", -1);
        let token = keys.issue(Uuid::new_v4(), Role::Customer, "c@example.com").unwrap();
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        let keys = JwtKeys::new(SECRET, "interiorquote", 1);
        assert!(keys.verify("not.a.jwt").is_err());
    }
}
