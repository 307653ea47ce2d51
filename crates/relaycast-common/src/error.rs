//! Unified error type for relaycast.
//!
//! Every component funnels its failures into [`Error`], which carries enough
//! context for HTTP handlers to derive a status code via [`Error::http_status`]
//! and for acquisition jobs to record a human-readable cause.

use std::fmt;

/// Unified error type covering the failure modes of the relay and the
/// acquisition pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested byte range cannot be served for an object of this size.
    #[error("Range not satisfiable: {range} (object size {total})")]
    RangeNotSatisfiable {
        /// The raw range that was requested.
        range: String,
        /// Authoritative size of the object, echoed in `Content-Range: bytes */total`.
        total: u64,
    },

    /// The backing store has no object with this id.
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// The backing store or an external provider could not be reached, or
    /// rejected the request for a reason other than a missing object.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// No acquisition job with this id is tracked.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Every source provider was tried and none produced a playable stream.
    #[error("No source found for '{query}'{}", last_error.as_ref().map(|e| format!(" (last error: {e})")).unwrap_or_default())]
    NoSourceFound {
        /// The query that was resolved.
        query: String,
        /// The last provider failure, kept for diagnostics.
        last_error: Option<String>,
    },

    /// Fetching the source media failed.
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// Storing the acquired media in the backing store failed.
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// An external tool (ffmpeg) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::RangeNotSatisfiable { .. } => 416,
            Error::ObjectNotFound(_) => 404,
            Error::UpstreamUnavailable(_) => 502,
            Error::JobNotFound(_) => 404,
            Error::NoSourceFound { .. } => 404,
            Error::DownloadFailed(_) => 502,
            Error::UploadFailed(_) => 502,
            Error::Tool { .. } => 502,
            Error::Validation(_) => 400,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Short machine-readable code for API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            Error::ObjectNotFound(_) => "object_not_found",
            Error::UpstreamUnavailable(_) => "upstream_unavailable",
            Error::JobNotFound(_) => "job_not_found",
            Error::NoSourceFound { .. } => "no_source_found",
            Error::DownloadFailed(_) => "download_failed",
            Error::UploadFailed(_) => "upload_failed",
            Error::Tool { .. } => "tool_error",
            Error::Validation(_) => "validation_error",
            Error::Io { .. } => "io_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Convenience constructor for [`Error::RangeNotSatisfiable`].
    pub fn range_not_satisfiable(range: impl Into<String>, total: u64) -> Self {
        Error::RangeNotSatisfiable {
            range: range.into(),
            total,
        }
    }

    /// Convenience constructor for [`Error::ObjectNotFound`].
    pub fn object_not_found(id: impl fmt::Display) -> Self {
        Error::ObjectNotFound(id.to_string())
    }

    /// Convenience constructor for [`Error::UpstreamUnavailable`].
    pub fn upstream(message: impl Into<String>) -> Self {
        Error::UpstreamUnavailable(message.into())
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
