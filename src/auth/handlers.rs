use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{LoginRequest, OtpRequest, SetPasswordRequest, StatusResponse, TokenResponse, VerifyOtpRequest},
        extractors::AuthUser,
        repo_types::User,
        services,
    },
    error::AppError,
    extract::ApiJson,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/otp", post(request_otp))
        .route("/otp-verify", post(verify_otp))
        .route("/set-password", post(set_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let token = services::login(&state, &payload.email, &payload.password).await?;
    Ok(Json(TokenResponse { token }))
}

#[instrument(skip(state, payload))]
pub async fn request_otp(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<OtpRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    services::request_otp(&state, &payload.email).await?;
    Ok(Json(StatusResponse::ok()))
}

#[instrument(skip(state, payload))]
pub async fn verify_otp(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<VerifyOtpRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    services::verify_otp(&state, &payload.email, &payload.otp).await?;
    Ok(Json(StatusResponse::ok()))
}

#[instrument(skip(state, payload))]
pub async fn set_password(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<SetPasswordRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    services::set_password(&state, &payload.email, &payload.password).await?;
    Ok(Json(StatusResponse::ok()))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<User>, AppError> {
    Ok(Json(services::get_user(&state, user_id).await?))
}
