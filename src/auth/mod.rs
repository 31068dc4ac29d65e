pub mod password;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SecurityConfig;

/// Longest token lifetime accepted from configuration, ten years
const MAX_EXPIRY_HOURS: u64 = 24 * 365 * 10;

static BEARER: Lazy<Regex> = Lazy::new(|| Regex::new(r"Bearer\s(\S+)").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: u64,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("Invalid JWT secret")]
    InvalidSecret,

    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

/// Issues and checks HS256 session tokens
#[derive(Debug, Clone)]
pub struct TokenService {
    secret: String,
    expiry: Duration,
}

impl TokenService {
    pub fn new(secret: impl Into<String>, expiry_hours: u64) -> Self {
        if expiry_hours > MAX_EXPIRY_HOURS {
            tracing::warn!(
                expiry_hours,
                max = MAX_EXPIRY_HOURS,
                "JWT expiry out of range, using the maximum"
            );
        }
        let hours = expiry_hours.min(MAX_EXPIRY_HOURS) as i64;
        Self {
            secret: secret.into(),
            expiry: Duration::hours(hours),
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(config.jwt_secret.clone(), config.jwt_expiry_hours)
    }

    pub fn create_jwt(&self, user_id: u64) -> Result<String, JwtError> {
        if self.secret.is_empty() {
            return Err(JwtError::InvalidSecret);
        }

        let now = Utc::now();
        let claims = Claims {
            user_id,
            exp: (now + self.expiry).timestamp(),
            iat: now.timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| JwtError::TokenGeneration(e.to_string()))
    }

    /// Signature and expiry check; expired means `now >= exp`
    pub fn validate(&self, token: &str) -> Result<Claims, JwtError> {
        if self.secret.is_empty() {
            return Err(JwtError::InvalidSecret);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| JwtError::InvalidToken(e.to_string()))?;

        if data.claims.exp <= Utc::now().timestamp() {
            return Err(JwtError::InvalidToken("token expired".to_string()));
        }
        Ok(data.claims)
    }

    /// User id carried by a valid token, `None` for a missing or bad one
    pub fn user_id_from_jwt(&self, token: Option<&str>) -> Option<u64> {
        let token = token?;
        match self.validate(token) {
            Ok(claims) => Some(claims.user_id),
            Err(e) => {
                tracing::debug!("Rejected token: {}", e);
                None
            }
        }
    }
}

/// Token part of an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: &str) -> Option<&str> {
    BEARER
        .captures(header.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_validate() {
        let tokens = TokenService::new("test-secret", 1);
        let jwt = tokens.create_jwt(42).unwrap();
        let claims = tokens.validate(&jwt).unwrap();
        assert_eq!(claims.user_id, 42);
        assert!(claims.exp > claims.iat);
        assert_eq!(tokens.user_id_from_jwt(Some(&jwt)), Some(42));
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let jwt = TokenService::new("one", 1).create_jwt(1).unwrap();
        assert!(TokenService::new("two", 1).validate(&jwt).is_err());
        assert_eq!(TokenService::new("two", 1).user_id_from_jwt(Some(&jwt)), None);
        assert_eq!(TokenService::new("two", 1).user_id_from_jwt(None), None);
    }

    #[test]
    fn oversized_expiry_is_capped() {
        let tokens = TokenService::new("secret", u64::MAX);
        let jwt = tokens.create_jwt(3).unwrap();
        let claims = tokens.validate(&jwt).unwrap();
        assert_eq!(claims.exp - claims.iat, (MAX_EXPIRY_HOURS * 3600) as i64);
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let tokens = TokenService::new("secret", 0);
        let jwt = tokens.create_jwt(7).unwrap();
        assert!(matches!(tokens.validate(&jwt), Err(JwtError::InvalidToken(_))));
    }

    #[test]
    fn empty_secret_cannot_sign() {
        assert!(matches!(
            TokenService::new("", 1).create_jwt(1),
            Err(JwtError::InvalidSecret)
        ));
    }

    #[test]
    fn extracts_bearer_token() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("  Bearer  x"), None);
        assert_eq!(bearer_token("Basic dXNlcjpw"), None);
    }

    #[test]
    fn claims_use_camel_case_user_id() {
        let json = serde_json::to_value(Claims { user_id: 3, exp: 10, iat: 5 }).unwrap();
        assert_eq!(json["userId"], 3);
    }
}
