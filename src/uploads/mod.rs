use std::time::Duration;

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{
    auth::extractors::AuthUser, error::AppError, extract::ApiQuery, state::AppState,
};

pub const UPLOAD_URL_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Deserialize)]
pub struct UploadUrlQuery {
    #[serde(default)]
    pub file_name: String,
}

#[derive(Debug, Serialize)]
pub struct UploadUrlResponse {
    pub url: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/uploads/get-url", post(get_upload_url))
}

/// Object key namespaced under the owner: `{user_id}/{file_name}`.
pub fn object_key(user_id: i64, file_name: &str) -> Result<String, AppError> {
    let name = file_name.trim();
    if name.is_empty() {
        return Err(AppError::invalid_request("file_name is required"));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(AppError::invalid_request("invalid file_name"));
    }
    Ok(format!("{user_id}/{name}"))
}

pub async fn presigned_upload_url(
    st: &AppState,
    user_id: i64,
    file_name: &str,
) -> Result<String, AppError> {
    let key = object_key(user_id, file_name)?;
    let url = st
        .storage
        .presign_put(&key, UPLOAD_URL_TTL)
        .await
        .map_err(|e| AppError::internal("failed to create upload url").with_source(e))?;
    info!(user_id, key = %key, "upload url issued");
    Ok(url)
}

#[instrument(skip(state, query))]
pub async fn get_upload_url(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiQuery(query): ApiQuery<UploadUrlQuery>,
) -> Result<Json<UploadUrlResponse>, AppError> {
    let url = presigned_upload_url(&state, user_id, &query.file_name).await?;
    Ok(Json(UploadUrlResponse { url }))
}
