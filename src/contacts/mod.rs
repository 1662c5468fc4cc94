use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod handlers;
pub mod patch;
pub mod policy;
pub mod query;
pub mod repo;
pub mod repo_types;
pub mod services;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::contact_routes())
        .merge(handlers::me_routes())
}
