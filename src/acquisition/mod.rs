//! Audio acquisition pipeline.
//!
//! A submitted query becomes a background job that resolves a source,
//! downloads it, transcodes it and uploads the result to the object store.
//! Observers follow a job through the [`ProgressChannel`].

pub mod download;
pub mod job;
pub mod progress;
pub mod runner;
pub mod store;
pub mod transcode;

pub use download::{format_eta, format_speed, DownloadProgress, HttpDownloader};
pub use job::{AcquisitionJob, JobSnapshot, JobStatus};
pub use progress::ProgressChannel;
pub use runner::{sanitize_title, JobRunner};
pub use store::{spawn_sweeper, JobStore};
pub use transcode::{FfmpegTranscoder, OutputFormat, Passthrough, Transcoder};
