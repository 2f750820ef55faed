//! JWT token generation and validation
//!
//! Tokens carry the actor: identity in `sub`, the `user`/`admin` role and an
//! optional display name.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use helpline_shared::{Actor, ActorRole};

/// JWT claims structure for Helpline actor tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (actor identity, e.g. email)
    pub sub: String,
    /// Actor role
    pub role: ActorRole,
    /// Display name shown next to the actor's messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
    /// JWT ID (jti)
    pub jti: String,
}

impl Claims {
    pub fn actor(&self) -> Actor {
        Actor {
            identity: self.sub.clone(),
            role: self.role,
            display_name: self.name.clone(),
        }
    }
}

/// JWT manager for token operations
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiry_hours: i64,
}

impl JwtManager {
    /// Create a new JWT manager
    pub fn new(secret: &str, token_expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_expiry_hours,
        }
    }

    /// Generate a token for `actor`. Returns `(token, jti)`.
    pub fn generate_token(&self, actor: &Actor) -> Result<(String, String), JwtError> {
        if actor.identity.trim().is_empty() {
            return Err(JwtError::Encoding("identity must not be empty".to_string()));
        }
        let now = OffsetDateTime::now_utc();
        let exp = now + Duration::hours(self.token_expiry_hours);
        let jti = Uuid::new_v4().to_string();

        let claims = Claims {
            sub: actor.identity.clone(),
            role: actor.role,
            name: actor.display_name.clone(),
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            jti: jti.clone(),
        };

        // Explicit algorithm prevents algorithm confusion attacks
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Encoding(e.to_string()))?;

        Ok((token, jti))
    }

    /// Validate and decode a token
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 60; // 60 second clock skew tolerance

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidToken => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::Invalid,
                _ => JwtError::Validation(e.to_string()),
            })
    }

    /// Validate a token and return the actor it names
    pub fn authenticate(&self, token: &str) -> Result<Actor, JwtError> {
        self.validate_token(token).map(|claims| claims.actor())
    }

    pub fn token_expiry_seconds(&self) -> i64 {
        self.token_expiry_hours * 3600
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Token encoding failed: {0}")]
    Encoding(String),
    #[error("Token validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]  // Allow unwrap() in tests for cleaner test code
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-chars!";

    #[test]
    fn test_token_generation_and_validation() {
        let jwt = JwtManager::new(SECRET, 24);
        let mut actor = Actor::admin("ops@example.com");
        actor.display_name = Some("Dana".into());

        let (token, jti) = jwt.generate_token(&actor).expect("Failed to generate token");
        let claims = jwt.validate_token(&token).expect("Invalid token");

        assert_eq!(claims.sub, "ops@example.com");
        assert_eq!(claims.role, ActorRole::Admin);
        assert_eq!(claims.jti, jti);
        assert_eq!(jwt.authenticate(&token).unwrap(), actor);
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let issuer = JwtManager::new(SECRET, 24);
        let verifier = JwtManager::new("another-secret-key-at-least-32-chars", 24);

        let (token, _) = issuer.generate_token(&Actor::user("amy@example.com")).unwrap();
        assert!(matches!(verifier.validate_token(&token), Err(JwtError::Invalid)));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let jwt = JwtManager::new(SECRET, -2);
        let (token, _) = jwt.generate_token(&Actor::user("amy@example.com")).unwrap();
        assert!(matches!(jwt.validate_token(&token), Err(JwtError::Expired)));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let jwt = JwtManager::new(SECRET, 24);
        assert!(jwt.validate_token("not-a-jwt").is_err());
        assert!(jwt.generate_token(&Actor::user("  ")).is_err());
    }
}
