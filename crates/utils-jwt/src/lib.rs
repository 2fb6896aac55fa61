use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("Invalid subject claim: {0}")]
    InvalidSubject(String),
}

/// Claims carried by an access token. The `sub` claim is the user's uuid;
/// the identity provider that mints these tokens is external to this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: Uuid, email: String, ttl_hours: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            email,
            iat: now.timestamp(),
            exp: (now + Duration::hours(ttl_hours)).timestamp(),
        }
    }

    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|_| JwtError::InvalidSubject(self.sub.clone()))
    }
}

#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtManager {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Signs a token for the given claims. Only exercised by tests and
    /// operator tooling; the server itself never issues tokens.
    pub fn generate_token(&self, claims: &Claims) -> Result<String, JwtError> {
        Ok(encode(&Header::default(), claims, &self.encoding_key)?)
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_preserves_claims() {
        let manager = JwtManager::new("test-secret");
        let user_id = Uuid::new_v4();
        let claims = Claims::new(user_id, "user@example.com".to_string(), 24);

        let token = manager.generate_token(&claims).unwrap();
        let decoded = manager.validate_token(&token).unwrap();

        assert_eq!(decoded.user_id().unwrap(), user_id);
        assert_eq!(decoded.email, "user@example.com");
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let manager = JwtManager::new("test-secret");
        let other = JwtManager::new("other-secret");
        let claims = Claims::new(Uuid::new_v4(), "user@example.com".to_string(), 24);

        let token = other.generate_token(&claims).unwrap();
        assert!(manager.validate_token(&token).is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let manager = JwtManager::new("test-secret");
        let claims = Claims::new(Uuid::new_v4(), "user@example.com".to_string(), -1);

        let token = manager.generate_token(&claims).unwrap();
        assert!(manager.validate_token(&token).is_err());
    }

    #[test]
    fn rejects_non_uuid_subject() {
        let claims = Claims {
            sub: "not-a-uuid".to_string(),
            email: "user@example.com".to_string(),
            iat: 0,
            exp: 0,
        };
        assert!(claims.user_id().is_err());
    }
}
