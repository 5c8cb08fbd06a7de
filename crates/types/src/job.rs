// crates/types/src/job.rs
//! Remote job snapshots as reported by the separation service.

use serde::{Deserialize, Serialize};

/// Server-assigned job identifier.
pub type JobId = String;

/// Lifecycle phase of a remote job.
///
/// `Unknown` is never sent by the service on purpose: it is the local
/// placeholder for "no snapshot yet", and also what an unrecognised status
/// string decodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    Queued,
    Running,
    Completed,
    Failed,
    #[serde(alias = "canceled")]
    Cancelled,
    #[default]
    #[serde(other)]
    Unknown,
}

impl JobPhase {
    /// Completed, failed and cancelled jobs never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Queued or running: the only phases a cancel request makes sense for.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest known snapshot of one remote job (`GET /jobs/{id}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Status bodies may omit the id; the adapter fills it from the request.
    #[serde(default)]
    pub id: JobId,
    #[serde(default)]
    pub status: JobPhase,
    /// Fraction in `[0, 1]`. Negative or missing means no data yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(
        default,
        rename = "output_dir",
        alias = "output_location",
        skip_serializing_if = "Option::is_none"
    )]
    pub output_location: Option<String>,
    #[serde(
        default,
        rename = "error",
        alias = "error_message",
        skip_serializing_if = "Option::is_none"
    )]
    pub error_message: Option<String>,
}

impl JobStatus {
    /// Placeholder snapshot for a job nothing has been fetched for yet.
    pub fn unknown(id: impl Into<JobId>) -> Self {
        Self {
            id: id.into(),
            status: JobPhase::Unknown,
            progress: None,
            output_location: None,
            error_message: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Progress clamped to `[0, 1]`, or `None` while the server has no data.
    pub fn progress(&self) -> Option<f64> {
        match self.progress {
            Some(p) if p.is_finite() && p >= 0.0 => Some(p.min(1.0)),
            _ => None,
        }
    }

    /// Progress as a whole percentage, rounded like the status panel shows it.
    pub fn percent(&self) -> Option<u8> {
        self.progress().map(|p| (p * 100.0).round() as u8)
    }

    /// Error text worth showing. A cancelled job's error is noise and is hidden.
    pub fn visible_error(&self) -> Option<&str> {
        if self.status == JobPhase::Cancelled {
            return None;
        }
        self.error_message.as_deref().filter(|e| !e.is_empty())
    }
}

/// A job the client is tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub id: JobId,
    /// Set when the user asks to cancel; cleared once a terminal status lands
    /// or the cancel call fails.
    #[serde(default)]
    pub cancel_requested: bool,
}

impl JobHandle {
    pub fn new(id: impl Into<JobId>) -> Self {
        Self {
            id: id.into(),
            cancel_requested: false,
        }
    }
}

/// Body of a successful `POST /jobs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub id: JobId,
}
