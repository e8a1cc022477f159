//! Bearer token minting and validation.
//!
//! Tokens are HS256 JWTs carrying the device and user they were issued to.
//! The signing secret is fixed for the life of the issuer; replacing it
//! invalidates every outstanding token.

use crate::clock::Clock;
use chrono::Duration;
use common::{AuthContext, AuthError, IssuedToken, Result, UserId, MIN_TOKEN_SECRET_LEN};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub device_id: String,
    pub user_id: UserId,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiration (Unix seconds)
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: std::time::Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        if secret.len() < MIN_TOKEN_SECRET_LEN {
            return Err(AuthError::Config(format!(
                "token secret must be at least {} characters",
                MIN_TOKEN_SECRET_LEN
            )));
        }
        let ttl = Duration::from_std(ttl)
            .map_err(|e| AuthError::Config(format!("invalid token lifetime: {}", e)))?;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
            clock,
        })
    }

    /// Mints a token for a verified device. A failure here is an operational
    /// fault, not a caller error.
    pub fn issue(&self, device_id: Uuid, user_id: UserId) -> Result<IssuedToken> {
        let issued_at = self.clock.now();
        let expires_at = issued_at + self.ttl;

        let claims = Claims {
            device_id: device_id.to_string(),
            user_id,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(format!("failed to sign token: {}", e)))?;

        Ok(IssuedToken {
            access_token,
            device_id,
            user_id,
            issued_at,
            expires_at,
        })
    }

    /// Checks signature and expiry and returns the typed caller identity.
    pub fn validate(&self, token: &str) -> Result<AuthContext> {
        let claims = self.decode_claims(token)?;
        let device_id = Uuid::parse_str(&claims.device_id)
            .map_err(|_| AuthError::Unauthorized("malformed device claim".to_string()))?;

        Ok(AuthContext {
            device_id,
            user_id: claims.user_id,
        })
    }

    pub fn decode_claims(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| {
                let reason = match err.kind() {
                    ErrorKind::ExpiredSignature => "token expired",
                    ErrorKind::InvalidSignature => "invalid signature",
                    ErrorKind::InvalidToken => "invalid token",
                    _ => "token validation failed",
                };
                AuthError::Unauthorized(reason.to_string())
            })
    }
}

/// Pulls the token out of an `Authorization: Bearer <token>` header value.
pub fn extract_bearer(header: Option<&str>) -> Option<&str> {
    let token = header?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use chrono::Utc;

    const SECRET: &str = "test-secret-that-is-at-least-32-characters-long";

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(SECRET, std::time::Duration::from_secs(300), Arc::new(SystemClock)).unwrap()
    }

    #[test]
    fn test_short_secret_rejected() {
        let result = TokenIssuer::new("short", std::time::Duration::from_secs(300), Arc::new(SystemClock));
        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[test]
    fn test_issue_carries_claims() {
        let issuer = issuer();
        let device_id = Uuid::new_v4();
        let token = issuer.issue(device_id, 42).unwrap();

        assert_eq!(token.device_id, device_id);
        assert_eq!(token.user_id, 42);
        assert_eq!(token.expires_at - token.issued_at, Duration::minutes(5));

        let claims = issuer.decode_claims(&token.access_token).unwrap();
        assert_eq!(claims.device_id, device_id.to_string());
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.exp - claims.iat, 300);

        let context = issuer.validate(&token.access_token).unwrap();
        assert_eq!(context, AuthContext { device_id, user_id: 42 });
    }

    #[test]
    fn test_expired_token_rejected() {
        let clock = Arc::new(ManualClock::new(Utc::now() - Duration::minutes(10)));
        let issuer = TokenIssuer::new(SECRET, std::time::Duration::from_secs(300), clock).unwrap();
        let token = issuer.issue(Uuid::new_v4(), 1).unwrap();

        assert!(matches!(
            issuer.validate(&token.access_token),
            Err(AuthError::Unauthorized(reason)) if reason == "token expired"
        ));
    }

    #[test]
    fn test_other_secret_rejected() {
        let token = issuer().issue(Uuid::new_v4(), 1).unwrap();
        let other = TokenIssuer::new(
            "another-secret-that-is-at-least-32-characters",
            std::time::Duration::from_secs(300),
            Arc::new(SystemClock),
        )
        .unwrap();

        assert!(matches!(other.validate(&token.access_token), Err(AuthError::Unauthorized(_))));
        assert!(matches!(issuer().validate("garbage"), Err(AuthError::Unauthorized(_))));
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer(Some("Bearer abc.def.ghi")), Some("abc.def.ghi"));
        assert_eq!(extract_bearer(Some("Bearer   ")), None);
        assert_eq!(extract_bearer(Some("Basic dXNlcg==")), None);
        assert_eq!(extract_bearer(None), None);
    }
}
