use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use relaycast_common::{Error, JobId};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;

use super::error::AppError;
use super::AppContext;
use crate::acquisition::JobSnapshot;

pub fn acquisition_routes() -> Router<AppContext> {
    Router::new()
        .route("/download", post(submit_download))
        .route("/progress/:job_id", get(job_progress))
        .route("/jobs/:job_id", get(get_job))
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub destination: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadAccepted {
    pub job_id: JobId,
}

/// Full job record as returned by `GET /jobs/{id}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: JobId,
    pub query: String,
    pub destination: String,
    #[serde(flatten)]
    pub snapshot: JobSnapshot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Start an acquisition job and return its id without waiting for it.
pub async fn submit_download(
    State(ctx): State<AppContext>,
    Json(request): Json<DownloadRequest>,
) -> Result<Json<DownloadAccepted>, AppError> {
    let job_id = ctx
        .runner
        .submit(&request.query, request.destination.as_deref())?;
    Ok(Json(DownloadAccepted { job_id }))
}

/// Push job snapshots as Server-Sent Events until the job finishes.
pub async fn job_progress(
    State(ctx): State<AppContext>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let id: JobId = job_id.parse()?;

    let stream = ctx.progress.subscribe(id).map(|snapshot| {
        let data = serde_json::to_string(&snapshot)
            .unwrap_or_else(|e| format!(r#"{{"error": "serialization failed: {}"}}"#, e));
        Ok(Event::default().data(data))
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

/// Read a job without consuming it.
pub async fn get_job(
    State(ctx): State<AppContext>,
    Path(job_id): Path<String>,
) -> Result<Json<JobView>, AppError> {
    let id: JobId = job_id.parse()?;
    let job = ctx
        .runner
        .jobs()
        .get(&id)
        .ok_or_else(|| Error::JobNotFound(id.to_string()))?;

    Ok(Json(JobView {
        id: job.id,
        snapshot: job.snapshot(),
        query: job.query,
        destination: job.destination,
        created_at: job.created_at,
        updated_at: job.updated_at,
        finished_at: job.finished_at,
    }))
}
