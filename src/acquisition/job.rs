//! Acquisition job records and their wire snapshot.

use chrono::{DateTime, Utc};
use relaycast_common::{JobId, ObjectId};
use serde::{Deserialize, Serialize};

/// Lifecycle of an acquisition job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Searching,
    Preparing,
    Downloading,
    Uploading,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Searching => "searching",
            JobStatus::Preparing => "preparing",
            JobStatus::Downloading => "downloading",
            JobStatus::Uploading => "uploading",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Full record of one acquisition job.
#[derive(Debug, Clone)]
pub struct AcquisitionJob {
    pub id: JobId,
    pub query: String,
    pub destination: String,
    pub status: JobStatus,
    /// 0-100, never decreases.
    pub percent: f32,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub title: Option<String>,
    pub message: Option<String>,
    pub object_id: Option<ObjectId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl AcquisitionJob {
    pub fn new(id: JobId, query: impl Into<String>, destination: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            query: query.into(),
            destination: destination.into(),
            status: JobStatus::Searching,
            percent: 0.0,
            speed: None,
            eta: None,
            title: None,
            message: None,
            object_id: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn raise_percent(&mut self, percent: f32) {
        let percent = percent.clamp(0.0, 100.0);
        if percent > self.percent {
            self.percent = percent;
        }
    }

    /// Move to a non-terminal stage. Ignored once the job is terminal.
    pub fn advance(&mut self, status: JobStatus, percent: f32) -> bool {
        if self.is_terminal() || status.is_terminal() {
            return false;
        }
        self.status = status;
        self.raise_percent(percent);
        if status != JobStatus::Downloading {
            self.speed = None;
            self.eta = None;
        }
        self.updated_at = Utc::now();
        true
    }

    /// Record download progress.
    pub fn update_download(&mut self, percent: f32, speed: Option<String>, eta: Option<String>) -> bool {
        if !self.advance(JobStatus::Downloading, percent) {
            return false;
        }
        self.speed = speed;
        self.eta = eta;
        true
    }

    pub fn complete(&mut self, title: impl Into<String>, object_id: ObjectId) -> bool {
        if self.is_terminal() {
            return false;
        }
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.percent = 100.0;
        self.speed = None;
        self.eta = None;
        self.title = Some(title.into());
        self.object_id = Some(object_id);
        self.updated_at = now;
        self.finished_at = Some(now);
        true
    }

    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        let now = Utc::now();
        self.status = JobStatus::Error;
        self.speed = None;
        self.eta = None;
        self.message = Some(message.into());
        self.updated_at = now;
        self.finished_at = Some(now);
        true
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            percent: self.percent,
            status: self.status,
            speed: self.speed.clone(),
            eta: self.eta.clone(),
            title: self.title.clone(),
            message: self.message.clone(),
            object_id: self.object_id.clone(),
        }
    }
}

/// Point-in-time view of a job as pushed to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub percent: f32,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, rename = "objectId", skip_serializing_if = "Option::is_none")]
    pub object_id: Option<ObjectId>,
}

impl JobSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
