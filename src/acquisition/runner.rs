//! Detached execution of acquisition jobs.
//!
//! A job runs `searching -> preparing -> downloading -> uploading ->
//! completed` on its own task. Any failure, including a panic, ends the job
//! in `error` with a readable cause. Nothing is retried.

use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use relaycast_common::{Error, JobId, Result};
use relaycast_store::{NewObject, ObjectStore};
use tempfile::TempDir;
use tracing::{debug, info, warn, Instrument};

use super::download::HttpDownloader;
use super::job::JobStatus;
use super::store::JobStore;
use super::transcode::Transcoder;
use crate::sources::SourceResolver;

/// Percent reported once the source is chosen.
const PREPARING_PERCENT: f32 = 10.0;
/// Span of the percent scale covered by the download.
const DOWNLOAD_SPAN: f32 = 80.0;
const TRANSCODED_PERCENT: f32 = 95.0;
const UPLOADING_PERCENT: f32 = 99.0;

/// Longest object name stem kept from a title.
const MAX_NAME_CHARS: usize = 180;

static UNSAFE_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/:*?"<>|\x00-\x1f]+"#).unwrap());
static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Turn a source title into a safe object name stem.
pub fn sanitize_title(title: &str) -> String {
    let cleaned = UNSAFE_NAME_CHARS.replace_all(title, " ");
    let collapsed = WHITESPACE_RUN.replace_all(cleaned.trim(), " ");
    let stem: String = collapsed
        .trim_matches(|c: char| c == '.' || c.is_whitespace())
        .chars()
        .take(MAX_NAME_CHARS)
        .collect();
    let stem = stem.trim_end().to_string();
    if stem.is_empty() {
        "audio".to_string()
    } else {
        stem
    }
}

/// Runs acquisition jobs in the background.
#[derive(Clone)]
pub struct JobRunner {
    jobs: JobStore,
    resolver: Arc<SourceResolver>,
    downloader: HttpDownloader,
    transcoder: Arc<dyn Transcoder>,
    objects: Arc<dyn ObjectStore>,
    temp_root: Option<PathBuf>,
    default_destination: Option<String>,
}

impl JobRunner {
    pub fn new(
        jobs: JobStore,
        resolver: Arc<SourceResolver>,
        downloader: HttpDownloader,
        transcoder: Arc<dyn Transcoder>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            jobs,
            resolver,
            downloader,
            transcoder,
            objects,
            temp_root: None,
            default_destination: None,
        }
    }

    /// Create per-job scratch directories under `dir` instead of the system
    /// temp directory.
    pub fn with_temp_root(mut self, dir: Option<PathBuf>) -> Self {
        self.temp_root = dir;
        self
    }

    /// Folder used when a submission names none.
    pub fn with_default_destination(mut self, destination: Option<String>) -> Self {
        self.default_destination = destination;
        self
    }

    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    /// Validate and start a job. Returns as soon as the record exists.
    pub fn submit(&self, query: &str, destination: Option<&str>) -> Result<JobId> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::validation("query must not be empty"));
        }

        let destination = destination
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .or(self.default_destination.as_deref())
            .ok_or_else(|| Error::validation("no destination given and none configured"))?
            .to_string();

        let id = self.jobs.create(query, &destination);
        info!(job_id = %id, query, destination = %destination, "Accepted acquisition job");

        let runner = self.clone();
        let query = query.to_string();
        let span = tracing::info_span!("job", job_id = %id);
        tokio::spawn(
            async move {
                // The inner task isolates panics from the bookkeeping below.
                let worker = tokio::spawn({
                    let runner = runner.clone();
                    async move { runner.run(id, &query, &destination).await }.in_current_span()
                });

                let message = match worker.await {
                    Ok(Ok(())) => return,
                    Ok(Err(e)) => e.to_string(),
                    Err(e) if e.is_panic() => "internal error while processing the job".to_string(),
                    Err(e) => format!("job aborted: {e}"),
                };

                warn!(cause = %message, "Acquisition job failed");
                runner.jobs.update(&id, |job| job.fail(message));
            }
            .instrument(span),
        );

        Ok(id)
    }

    async fn run(&self, id: JobId, query: &str, destination: &str) -> Result<()> {
        let source = self.resolver.resolve(query).await?;
        self.jobs
            .update(&id, |job| job.advance(JobStatus::Preparing, PREPARING_PERCENT));

        let scratch = self.scratch_dir()?;
        let source_path = scratch.path().join("source");

        debug!(url = %source.stream_url, "Downloading source");
        let jobs = self.jobs.clone();
        self.downloader
            .download(&source.stream_url, &source_path, move |progress| {
                let fraction = progress.fraction().unwrap_or(0.0) as f32;
                let percent = PREPARING_PERCENT + DOWNLOAD_SPAN * fraction;
                let speed = Some(progress.speed_label());
                let eta = progress.eta_label();
                jobs.update(&id, |job| job.update_download(percent, speed, eta));
            })
            .await?;

        let format = self.transcoder.output_format(&source.mime_type);
        let output_path = scratch.path().join(format!("output.{}", format.extension));
        self.transcoder
            .transcode(&source_path, &output_path)
            .await
            .map_err(|e| Error::tool(self.transcoder.name(), format!("{e:#}")))?;
        self.jobs
            .update(&id, |job| job.update_download(TRANSCODED_PERCENT, None, None));

        self.jobs
            .update(&id, |job| job.advance(JobStatus::Uploading, UPLOADING_PERCENT));
        let object = NewObject {
            name: format!("{}.{}", sanitize_title(&source.title), format.extension),
            parent: destination.to_string(),
            mime_type: format.mime_type,
        };
        let stored = self.objects.create(&object, &output_path).await?;

        info!(object_id = %stored.id, name = %object.name, "Acquisition job completed");
        self.jobs
            .update(&id, |job| job.complete(source.title.clone(), stored.id.clone()));
        Ok(())
    }

    fn scratch_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("relaycast-job-");
        let dir = match self.temp_root.as_deref() {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("transcoder", &self.transcoder.name())
            .field("store", &self.objects.name())
            .field("jobs", &self.jobs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_titles() {
        assert_eq!(sanitize_title("AC/DC - Back In Black"), "AC DC - Back In Black");
        assert_eq!(sanitize_title("  What?  Is   <this>  "), "What Is this");
        assert_eq!(sanitize_title("..hidden.."), "hidden");
        assert_eq!(sanitize_title("///"), "audio");
        assert_eq!(sanitize_title(&"x".repeat(500)).len(), MAX_NAME_CHARS);
    }
}
