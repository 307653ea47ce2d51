//! Audio transcoding of downloaded sources.
//!
//! [`FfmpegTranscoder`] re-encodes to the configured format. When ffmpeg is
//! disabled or missing, [`Passthrough`] keeps the source audio in its native
//! container.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::TranscodeConfig;

/// Maximum time a single transcode may take.
const TRANSCODE_TIMEOUT: Duration = Duration::from_secs(600);

/// Container of the stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFormat {
    /// File extension without the dot.
    pub extension: String,
    pub mime_type: String,
}

/// Converts a downloaded source file into the stored format.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &'static str;

    /// Format produced for a source with MIME type `source_mime`.
    fn output_format(&self, source_mime: &str) -> OutputFormat;

    /// Convert `input` into `output`.
    async fn transcode(&self, input: &Path, output: &Path) -> Result<()>;
}

/// MIME type for an audio file extension.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "m4a" | "aac" | "mp4" => "audio/mp4",
        "ogg" | "opus" => "audio/ogg",
        "webm" => "audio/webm",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}

/// File extension for an audio MIME type.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let base = mime.split(';').next().unwrap_or_default().trim();
    match base.to_ascii_lowercase().as_str() {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some("m4a"),
        "audio/webm" => Some("webm"),
        "audio/ogg" | "audio/opus" => Some("ogg"),
        "audio/flac" => Some("flac"),
        "audio/wav" | "audio/x-wav" => Some("wav"),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// ffmpeg
// ---------------------------------------------------------------------------

/// Re-encodes audio with ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
    codec: String,
    bitrate: String,
    format: String,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(program: PathBuf, config: &TranscodeConfig) -> Self {
        Self {
            program,
            codec: config.codec.clone(),
            bitrate: config.bitrate.clone(),
            format: config.format.clone(),
            timeout: TRANSCODE_TIMEOUT,
        }
    }

    /// Locate ffmpeg from the configured path or `PATH`.
    pub fn discover(config: &TranscodeConfig) -> Option<Self> {
        locate_ffmpeg(config).map(|program| Self::new(program, config))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn build_args(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-i".into(),
            input.to_string_lossy().into_owned(),
            "-vn".into(),
            "-c:a".into(),
            self.codec.clone(),
            "-b:a".into(),
            self.bitrate.clone(),
            "-f".into(),
            self.format.clone(),
            output.to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn output_format(&self, _source_mime: &str) -> OutputFormat {
        OutputFormat {
            extension: self.format.clone(),
            mime_type: mime_for_extension(&self.format).to_string(),
        }
    }

    async fn transcode(&self, input: &Path, output: &Path) -> Result<()> {
        let args = self.build_args(input, output);
        debug!(program = %self.program.display(), ?args, "Running ffmpeg");

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program.display()))?;

        let result = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .with_context(|| format!("ffmpeg timed out after {}s", self.timeout.as_secs()))?
            .context("failed to wait for ffmpeg")?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let last_line = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
            anyhow::bail!("ffmpeg exited with {}: {}", result.status, last_line);
        }

        let size = tokio::fs::metadata(output)
            .await
            .context("ffmpeg produced no output")?
            .len();
        if size == 0 {
            anyhow::bail!("ffmpeg produced an empty file");
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Passthrough
// ---------------------------------------------------------------------------

/// Stores the downloaded audio unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

#[async_trait]
impl Transcoder for Passthrough {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn output_format(&self, source_mime: &str) -> OutputFormat {
        match extension_for_mime(source_mime) {
            Some(ext) => OutputFormat {
                extension: ext.to_string(),
                mime_type: mime_for_extension(ext).to_string(),
            },
            None => OutputFormat {
                extension: "bin".to_string(),
                mime_type: if source_mime.is_empty() {
                    "application/octet-stream".to_string()
                } else {
                    source_mime.to_string()
                },
            },
        }
    }

    async fn transcode(&self, input: &Path, output: &Path) -> Result<()> {
        tokio::fs::rename(input, output)
            .await
            .with_context(|| format!("failed to move {} into place", input.display()))
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

fn locate_ffmpeg(config: &TranscodeConfig) -> Option<PathBuf> {
    match config.ffmpeg_path.as_deref() {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        // Configured path does not exist; fall back to PATH.
        _ => which::which("ffmpeg").ok(),
    }
}

/// Pick the transcoder for `config`.
pub fn from_config(config: &TranscodeConfig) -> Arc<dyn Transcoder> {
    if !config.enabled {
        info!("Transcoding disabled, storing source audio as-is");
        return Arc::new(Passthrough);
    }
    match FfmpegTranscoder::discover(config) {
        Some(ffmpeg) => {
            info!(path = %ffmpeg.program().display(), format = %config.format, "Using ffmpeg for transcoding");
            Arc::new(ffmpeg)
        }
        None => {
            warn!("ffmpeg not found, storing source audio as-is");
            Arc::new(Passthrough)
        }
    }
}

/// Availability of an external tool.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// Report on the external tools the acquisition pipeline can use.
pub fn check_tools(config: &TranscodeConfig) -> Vec<ToolInfo> {
    let path = locate_ffmpeg(config);
    let version = path.as_deref().and_then(|p| {
        let output = std::process::Command::new(p).arg("-version").output().ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .map(|l| l.to_string())
    });

    vec![ToolInfo {
        name: "ffmpeg".to_string(),
        available: path.is_some(),
        version,
        path,
    }]
}
