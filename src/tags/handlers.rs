use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;
use tracing::instrument;

use crate::{
    auth::extractors::{AuthUser, MaybeAuthUser},
    error::AppError,
    extract::{ApiJson, ApiPath},
    state::AppState,
    tags::{repo::Tag, services},
};

#[derive(Debug, Deserialize)]
pub struct CreateTagRequest {
    #[serde(default)]
    pub name: String,
}

pub fn tag_routes() -> Router<AppState> {
    Router::new()
        .route("/tags", get(list_tags).post(create_tag))
        .route("/tags/:id", delete(delete_tag))
}

#[instrument(skip(state, _caller))]
pub async fn list_tags(
    State(state): State<AppState>,
    _caller: MaybeAuthUser,
) -> Result<Json<Vec<Tag>>, AppError> {
    Ok(Json(services::list_tags(&state).await?))
}

#[instrument(skip(state, payload))]
pub async fn create_tag(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<CreateTagRequest>,
) -> Result<(StatusCode, Json<Tag>), AppError> {
    let tag = services::create_tag(&state, &payload.name).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

#[instrument(skip(state))]
pub async fn delete_tag(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, AppError> {
    services::delete_tag(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
