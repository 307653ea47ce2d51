use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::Response,
    routing::get,
    Router,
};
use relaycast_common::ObjectId;

use super::error::AppError;
use super::AppContext;

pub fn stream_routes() -> Router<AppContext> {
    Router::new().route("/stream/:object_id", get(stream_object))
}

/// Stream an object from the backing store, honoring `Range`.
pub async fn stream_object(
    State(ctx): State<AppContext>,
    Path(object_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let id = ObjectId::parse(object_id)?;

    // A header that is not valid ASCII is treated as malformed.
    let range = headers
        .get(header::RANGE)
        .map(|value| value.to_str().unwrap_or_default());

    Ok(ctx.relay.relay(&id, range).await?)
}
