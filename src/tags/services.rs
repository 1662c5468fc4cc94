use tracing::info;

use crate::{error::AppError, state::AppState, tags::repo::Tag};

pub async fn list_tags(st: &AppState) -> Result<Vec<Tag>, AppError> {
    st.tags
        .list()
        .await
        .map_err(|e| AppError::internal("failed to list tags").with_source(e))
}

pub async fn create_tag(st: &AppState, name: &str) -> Result<Tag, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::invalid_request("tag name is required"));
    }
    let tag = st
        .tags
        .create(name)
        .await
        .map_err(|e| AppError::from_store(e, "tag not found", "failed to create tag"))?;
    info!(tag_id = tag.id, "tag created");
    Ok(tag)
}

pub async fn delete_tag(st: &AppState, id: i64) -> Result<(), AppError> {
    st.tags
        .delete(id)
        .await
        .map_err(|e| AppError::from_store(e, "tag not found", "failed to delete tag"))?;
    info!(tag_id = id, "tag deleted");
    Ok(())
}
