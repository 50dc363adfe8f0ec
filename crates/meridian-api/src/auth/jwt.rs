//! JWT token generation and validation
//!
//! Access and refresh tokens are HMAC-signed and carry only the subject, an
//! expiry and a `type` discriminator.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use meridian_core::config::{AppConfig, JwtAlgorithm};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token purpose, stored in the `type` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Expiration timestamp (Unix epoch seconds)
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: TokenType,
}

/// JWT token generation and validation errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode JWT: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token format")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Invalid token signature")]
    InvalidSignature,
}

/// Signing settings derived from [`AppConfig`]
#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub algorithm: Algorithm,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

impl JwtConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        let algorithm = match config.auth.algorithm {
            JwtAlgorithm::HS256 => Algorithm::HS256,
            JwtAlgorithm::HS384 => Algorithm::HS384,
            JwtAlgorithm::HS512 => Algorithm::HS512,
        };
        Self {
            secret: config.app.secret_key.clone(),
            algorithm,
            access_ttl: Duration::minutes(config.auth.access_token_expire_minutes),
            refresh_ttl: Duration::days(config.auth.refresh_token_expire_days),
        }
    }
}

fn encode_claims(config: &JwtConfig, claims: &Claims) -> Result<String, JwtError> {
    let token = encode(
        &Header::new(config.algorithm),
        claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )?;
    Ok(token)
}

/// Issue an access token for `subject`
///
/// `expires_delta` overrides the configured lifetime.
///
/// # Example
///
/// ```no_run
/// use meridian_api::auth::jwt::{create_access_token, decode_token, JwtConfig};
/// use meridian_core::AppConfig;
///
/// let config = JwtConfig::from_config(&AppConfig::from_env().unwrap());
/// let token = create_access_token(&config, "42", None).unwrap();
/// assert_eq!(decode_token(&config, &token).unwrap().sub, "42");
/// ```
pub fn create_access_token(
    config: &JwtConfig,
    subject: impl ToString,
    expires_delta: Option<Duration>,
) -> Result<String, JwtError> {
    let claims = Claims {
        sub: subject.to_string(),
        exp: (Utc::now() + expires_delta.unwrap_or(config.access_ttl)).timestamp(),
        token_type: TokenType::Access,
    };
    encode_claims(config, &claims)
}

/// Issue a refresh token for `subject` with the configured lifetime
pub fn create_refresh_token(
    config: &JwtConfig,
    subject: impl ToString,
) -> Result<String, JwtError> {
    let claims = Claims {
        sub: subject.to_string(),
        exp: (Utc::now() + config.refresh_ttl).timestamp(),
        token_type: TokenType::Refresh,
    };
    encode_claims(config, &claims)
}

/// Verify signature and expiry and return the claims
pub fn decode_token(config: &JwtConfig, token: &str) -> Result<Claims, JwtError> {
    let validation = Validation::new(config.algorithm);

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
        jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::InvalidSignature,
        _ => JwtError::InvalidToken,
    })?;

    Ok(token_data.claims)
}
