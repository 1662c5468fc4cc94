use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;

use super::jwt::SessionKeys;
use crate::error::AppError;

/// Caller identity for routes that require a session.
pub struct AuthUser(pub i64);

/// Caller identity for routes open to anonymous callers. `None` when no
/// `Authorization` header was sent; a malformed or invalid header is still rejected.
pub struct MaybeAuthUser(pub Option<i64>);

/// `Authorization: Bearer <token>`, scheme matched case-insensitively.
fn bearer_token(parts: &Parts) -> Result<Option<&str>, AppError> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::unauthorized("invalid authorization header"))?;
    let mut fields = value.split_whitespace();
    match (fields.next(), fields.next(), fields.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => {
            Ok(Some(token))
        }
        _ => Err(AppError::unauthorized("invalid authorization header")),
    }
}

fn authenticate(keys: &SessionKeys, token: &str) -> Result<i64, AppError> {
    let claims = keys.verify(token).map_err(|e| {
        warn!(error = %e, "invalid or expired token");
        AppError::unauthorized("invalid or expired token")
    })?;
    claims
        .user_id()
        .map_err(|e| AppError::unauthorized("invalid or expired token").with_source(e))
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?
            .ok_or_else(|| AppError::unauthorized("authorization header required"))?;
        let keys = SessionKeys::from_ref(state);
        authenticate(&keys, token).map(AuthUser)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match bearer_token(parts)? {
            None => Ok(MaybeAuthUser(None)),
            Some(token) => {
                let keys = SessionKeys::from_ref(state);
                authenticate(&keys, token).map(|id| MaybeAuthUser(Some(id)))
            }
        }
    }
}
