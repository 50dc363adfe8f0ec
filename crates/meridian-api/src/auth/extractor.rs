//! Bearer-token extractor
//!
//! ```ignore
//! async fn me(CurrentUser(subject): CurrentUser) -> String {
//!     subject
//! }
//! ```

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use std::sync::Arc;
use tracing::debug;

use super::jwt::{decode_token, TokenType};
use crate::error::AppError;
use crate::state::AppState;

/// Subject of a valid access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub String);

impl CurrentUser {
    pub fn subject(&self) -> &str {
        &self.0
    }
}

/// Token from an `Authorization: Bearer <token>` header
fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = Arc::<AppState>::from_ref(state);
        let token = bearer_token(parts).ok_or_else(AppError::unauthorized)?;

        let claims = decode_token(&state.jwt, token).map_err(|e| {
            debug!(error = %e, "rejected bearer token");
            AppError::Unauthorized("Invalid or expired token".to_string())
        })?;

        if claims.token_type != TokenType::Access {
            return Err(AppError::Unauthorized("Invalid token type".to_string()));
        }

        Ok(CurrentUser(claims.sub))
    }
}
