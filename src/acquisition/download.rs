//! Streaming HTTP download of source media with progress reporting.

use std::path::Path;
use std::time::{Duration, Instant};

use futures::StreamExt;
use relaycast_common::{Error, Result};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Minimum time between two progress callbacks.
const REPORT_INTERVAL: Duration = Duration::from_millis(250);

/// Progress of a running download.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    pub downloaded: u64,
    /// Announced body size, if the server sent one.
    pub total: Option<u64>,
    /// Average bytes per second since the transfer started.
    pub bytes_per_sec: f64,
}

impl DownloadProgress {
    /// Fraction done in 0.0..=1.0, when the size is known.
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => Some((self.downloaded as f64 / total as f64).min(1.0)),
            _ => None,
        }
    }

    pub fn speed_label(&self) -> String {
        format_speed(self.bytes_per_sec)
    }

    pub fn eta_label(&self) -> Option<String> {
        let total = self.total?;
        if self.bytes_per_sec <= 0.0 {
            return None;
        }
        let left = total.saturating_sub(self.downloaded) as f64;
        Some(format_eta((left / self.bytes_per_sec).ceil() as u64))
    }
}

/// Format a transfer rate, e.g. `1.50MiB/s`.
pub fn format_speed(bytes_per_sec: f64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    if bytes_per_sec >= MIB {
        format!("{:.2}MiB/s", bytes_per_sec / MIB)
    } else if bytes_per_sec >= KIB {
        format!("{:.2}KiB/s", bytes_per_sec / KIB)
    } else {
        format!("{:.0}B/s", bytes_per_sec.max(0.0))
    }
}

/// Format remaining seconds as `mm:ss`.
pub fn format_eta(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Downloads source media to local files.
#[derive(Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
    idle_timeout: Duration,
}

impl HttpDownloader {
    pub fn new(client: reqwest::Client, idle_timeout: Duration) -> Self {
        Self {
            client,
            idle_timeout,
        }
    }

    /// Stream `url` into `dest`, calling `on_progress` as bytes arrive.
    ///
    /// Fails when the server stays silent longer than the idle timeout, either
    /// before sending headers or mid-body, or when the body is empty or
    /// shorter than announced.
    pub async fn download<F>(&self, url: &str, dest: &Path, mut on_progress: F) -> Result<u64>
    where
        F: FnMut(&DownloadProgress) + Send,
    {
        let response = tokio::time::timeout(self.idle_timeout, self.client.get(url).send())
            .await
            .map_err(|_| {
                Error::DownloadFailed(format!(
                    "source sent no response within {:?}",
                    self.idle_timeout
                ))
            })?
            .map_err(|e| Error::DownloadFailed(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::DownloadFailed(format!("source answered {status}")));
        }

        let total = response.content_length();
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| Error::DownloadFailed(format!("cannot create {}: {e}", dest.display())))?;

        let started = Instant::now();
        let mut last_report: Option<Instant> = None;
        let mut progress = DownloadProgress {
            downloaded: 0,
            total,
            bytes_per_sec: 0.0,
        };

        let mut body = response.bytes_stream();
        loop {
            let chunk = match tokio::time::timeout(self.idle_timeout, body.next()).await {
                Err(_) => {
                    return Err(Error::DownloadFailed(format!(
                        "no data received for {:?}",
                        self.idle_timeout
                    )))
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    return Err(Error::DownloadFailed(format!("transfer interrupted: {e}")))
                }
                Ok(Some(Ok(chunk))) => chunk,
            };

            file.write_all(&chunk)
                .await
                .map_err(|e| Error::DownloadFailed(format!("write failed: {e}")))?;

            progress.downloaded += chunk.len() as u64;
            let elapsed = started.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                progress.bytes_per_sec = progress.downloaded as f64 / elapsed;
            }

            if last_report.map_or(true, |at| at.elapsed() >= REPORT_INTERVAL) {
                on_progress(&progress);
                last_report = Some(Instant::now());
            }
        }

        file.flush()
            .await
            .map_err(|e| Error::DownloadFailed(format!("write failed: {e}")))?;

        if progress.downloaded == 0 {
            return Err(Error::DownloadFailed("source returned an empty body".into()));
        }
        if let Some(total) = total {
            if progress.downloaded < total {
                return Err(Error::DownloadFailed(format!(
                    "source ended after {} of {} bytes",
                    progress.downloaded, total
                )));
            }
        }

        on_progress(&progress);
        debug!(bytes = progress.downloaded, dest = %dest.display(), "Download finished");
        Ok(progress.downloaded)
    }
}
