use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use relaycast_common::{Error, ObjectId, ObjectMetadata};
use serde::Deserialize;

use super::error::AppError;
use super::AppContext;

pub fn library_routes() -> Router<AppContext> {
    Router::new()
        .route("/library/copy", post(copy_object))
        .route("/library/trash", post(trash_object))
        .route("/library/folders/:parent", get(list_folder))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// `audio` or `video`; anything else lists every object.
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyRequest {
    pub object_id: String,
    pub parent: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrashRequest {
    pub object_id: String,
}

fn mime_prefix(kind: Option<&str>) -> Result<Option<&'static str>, Error> {
    match kind.map(|k| k.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("all") => Ok(None),
        Some("audio") => Ok(Some("audio/")),
        Some("video") => Ok(Some("video/")),
        Some(other) => Err(Error::validation(format!("unknown kind: {other}"))),
    }
}

/// List the objects of a folder, optionally only audio or video.
pub async fn list_folder(
    State(ctx): State<AppContext>,
    Path(parent): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ObjectMetadata>>, AppError> {
    let prefix = mime_prefix(query.kind.as_deref())?;
    let objects = ctx.objects.list(&parent, prefix).await?;
    Ok(Json(objects))
}

/// Copy an object into another folder.
pub async fn copy_object(
    State(ctx): State<AppContext>,
    Json(request): Json<CopyRequest>,
) -> Result<Json<ObjectMetadata>, AppError> {
    let id = ObjectId::parse(request.object_id)?;
    let parent = request.parent.trim();
    if parent.is_empty() {
        return Err(Error::validation("parent must not be empty").into());
    }

    let copy = ctx.objects.copy(&id, parent).await?;
    tracing::info!(object_id = %id, copy_id = %copy.id, parent, "Copied object");
    Ok(Json(copy))
}

/// Move an object to the store's trash.
pub async fn trash_object(
    State(ctx): State<AppContext>,
    Json(request): Json<TrashRequest>,
) -> Result<StatusCode, AppError> {
    let id = ObjectId::parse(request.object_id)?;
    ctx.objects.trash(&id).await?;
    tracing::info!(object_id = %id, "Trashed object");
    Ok(StatusCode::NO_CONTENT)
}
