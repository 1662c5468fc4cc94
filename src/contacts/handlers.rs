use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::StatusResponse,
        extractors::{AuthUser, MaybeAuthUser},
    },
    contacts::{
        dto::{
            CreateAddressRequest, CreateContactRequest, ListContactsQuery, PageQuery,
            UpdateContactRequest, VisibilityRequest,
        },
        repo_types::{Address, Contact, ContactsPage},
        services,
    },
    error::AppError,
    extract::{ApiJson, ApiPath, ApiQuery},
    state::AppState,
};

pub fn contact_routes() -> Router<AppState> {
    Router::new()
        .route("/contacts", post(create_contact).get(list_contacts))
        .route(
            "/contacts/:id",
            get(get_contact).put(update_contact).delete(delete_contact),
        )
        .route("/contacts/:id/visibility", put(update_visibility))
        .route("/contacts/:id/address", post(create_address))
        .route("/contacts/:id/save", post(save_contact).delete(delete_saved_contact))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me/contacts", get(list_my_contacts))
        .route("/me/saved-contacts", get(list_saved_contacts))
}

#[instrument(skip(state, payload))]
pub async fn create_contact(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<CreateContactRequest>,
) -> Result<(StatusCode, Json<Contact>), AppError> {
    let contact = services::create_contact(&state, user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(contact)))
}

#[instrument(skip(state, query))]
pub async fn list_contacts(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    ApiQuery(query): ApiQuery<ListContactsQuery>,
) -> Result<Json<ContactsPage>, AppError> {
    Ok(Json(services::list_contacts(&state, viewer, query).await?))
}

#[instrument(skip(state))]
pub async fn get_contact(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Contact>, AppError> {
    Ok(Json(services::get_contact(&state, viewer, id).await?))
}

#[instrument(skip(state, payload))]
pub async fn update_contact(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<UpdateContactRequest>,
) -> Result<Json<Contact>, AppError> {
    Ok(Json(services::update_contact(&state, user_id, id, payload).await?))
}

#[instrument(skip(state))]
pub async fn delete_contact(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, AppError> {
    services::delete_contact(&state, user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload))]
pub async fn update_visibility(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<VisibilityRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    services::update_contact_visibility(&state, user_id, id, &payload.visibility).await?;
    Ok(Json(StatusResponse::ok()))
}

#[instrument(skip(state, payload))]
pub async fn create_address(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<CreateAddressRequest>,
) -> Result<(StatusCode, Json<Address>), AppError> {
    let address = services::create_contact_address(&state, user_id, id, payload).await?;
    Ok((StatusCode::CREATED, Json(address)))
}

#[instrument(skip(state))]
pub async fn save_contact(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, AppError> {
    services::save_contact(&state, user_id, id).await?;
    Ok(StatusCode::CREATED)
}

#[instrument(skip(state))]
pub async fn delete_saved_contact(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, AppError> {
    services::delete_saved_contact(&state, user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, query))]
pub async fn list_my_contacts(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Json<ContactsPage>, AppError> {
    Ok(Json(services::list_my_contacts(&state, user_id, query).await?))
}

#[instrument(skip(state))]
pub async fn list_saved_contacts(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<Contact>>, AppError> {
    Ok(Json(services::list_saved_contacts(&state, user_id).await?))
}
