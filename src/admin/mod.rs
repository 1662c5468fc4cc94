use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::post,
    Json, Router,
};
use subtle::ConstantTimeEq;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::SetPasswordRequest,
        password::hash_blocking,
        repo_types::{NewUser, User},
        services::{is_valid_email, normalize_email},
    },
    error::AppError,
    extract::ApiJson,
    state::AppState,
};

pub const ADMIN_KEY_HEADER: &str = "x-api-key";

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route_layer(middleware::from_fn_with_state(state, require_admin_key))
}

/// Compares in constant time for equal-length inputs.
fn key_matches(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Rejects requests without the static admin key. Session tokens are not accepted here.
pub async fn require_admin_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let authorized = req
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|key| key_matches(key, &state.config.admin_api_key));
    if !authorized {
        warn!(uri = %req.uri(), "admin request without valid key");
        return Err(AppError::unauthorized("invalid admin key"));
    }
    Ok(next.run(req).await)
}

/// Provisions a verified user with a password, skipping the OTP flow.
pub async fn provision_user(st: &AppState, raw_email: &str, password: &str) -> Result<User, AppError> {
    let email = normalize_email(raw_email);
    if email.is_empty() || password.is_empty() {
        return Err(AppError::invalid_request("email and password are required"));
    }
    if !is_valid_email(&email) {
        return Err(AppError::invalid_request("invalid email"));
    }

    let new = NewUser {
        email,
        password_hash: Some(hash_blocking(password.to_string()).await?),
        email_verified_at: Some(OffsetDateTime::now_utc()),
    };
    let user = st
        .users
        .create(&new)
        .await
        .map_err(|e| AppError::from_store(e, "user not found", "failed to create user"))?;
    info!(user_id = user.id, "user provisioned");
    Ok(user)
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<SetPasswordRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = provision_user(&state, &payload.email, &payload.password).await?;
    Ok((StatusCode::CREATED, Json(user)))
}
