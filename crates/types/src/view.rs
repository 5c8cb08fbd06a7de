// crates/types/src/view.rs
//! What a UI should render for a tracked job.
//!
//! The remote snapshot and the local cancel-requested flag are stored
//! separately; [`display_state`] merges them. A terminal snapshot always wins
//! over the overlay.

use serde::Serialize;

use crate::job::{JobId, JobPhase, JobStatus};

/// Merged remote + local state of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum EffectiveState {
    Unknown,
    Queued { progress: Option<f64> },
    Running { progress: Option<f64> },
    /// Cancel requested locally, server has not reported a terminal status yet.
    Cancelling { progress: Option<f64> },
    Completed { output_location: Option<String> },
    Failed { error: Option<String> },
    Cancelled,
    /// The service no longer knows the job; tracking has ended.
    Gone,
}

impl EffectiveState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Queued { .. } => "queued",
            Self::Running { .. } => "running",
            Self::Cancelling { .. } => "cancelling",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
            Self::Gone => "gone",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Cancelled
        )
    }

    pub fn progress(&self) -> Option<f64> {
        match self {
            Self::Queued { progress } | Self::Running { progress } | Self::Cancelling { progress } => {
                *progress
            }
            Self::Completed { .. } => Some(1.0),
            _ => None,
        }
    }
}

/// Merge a snapshot with the cancel overlay.
pub fn display_state(snapshot: Option<&JobStatus>, cancel_requested: bool) -> EffectiveState {
    let phase = snapshot.map(|s| s.status).unwrap_or_default();
    let progress = snapshot.and_then(JobStatus::progress);

    match phase {
        JobPhase::Completed => EffectiveState::Completed {
            output_location: snapshot.and_then(|s| s.output_location.clone()),
        },
        JobPhase::Failed => EffectiveState::Failed {
            error: snapshot.and_then(|s| s.visible_error().map(str::to_string)),
        },
        JobPhase::Cancelled => EffectiveState::Cancelled,
        _ if cancel_requested => EffectiveState::Cancelling { progress },
        JobPhase::Queued => EffectiveState::Queued { progress },
        JobPhase::Running => EffectiveState::Running { progress },
        JobPhase::Unknown => EffectiveState::Unknown,
    }
}

/// Render-ready view of one tracked job, including which actions are enabled.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: JobId,
    pub snapshot: Option<JobStatus>,
    pub cancel_requested: bool,
    pub downloading: bool,
    /// Last polling or cancel failure. Cleared by the next successful poll.
    pub last_error: Option<String>,
    /// The service answered 404 for this job. Nothing will update it again.
    pub gone: bool,
    pub state: EffectiveState,
}

impl JobView {
    pub fn new(
        id: JobId,
        snapshot: Option<JobStatus>,
        cancel_requested: bool,
        downloading: bool,
        last_error: Option<String>,
    ) -> Self {
        let state = display_state(snapshot.as_ref(), cancel_requested);
        Self {
            id,
            snapshot,
            cancel_requested,
            downloading,
            last_error,
            gone: false,
            state,
        }
    }

    /// Mark the job as unknown to the service. A terminal snapshot still wins;
    /// otherwise the state becomes [`EffectiveState::Gone`] and the cancel
    /// overlay ends.
    pub fn with_gone(mut self, gone: bool) -> Self {
        self.gone = gone;
        if gone && !self.is_terminal() {
            self.cancel_requested = false;
            self.state = EffectiveState::Gone;
        }
        self
    }

    /// Nothing more will change for this job: it settled or vanished.
    pub fn is_settled(&self) -> bool {
        self.is_terminal() || self.gone
    }

    pub fn phase(&self) -> JobPhase {
        self.snapshot.as_ref().map(|s| s.status).unwrap_or_default()
    }

    pub fn is_terminal(&self) -> bool {
        self.phase().is_terminal()
    }

    /// Cancel is offered for queued/running jobs not already being cancelled.
    pub fn can_cancel(&self) -> bool {
        self.phase().is_active() && !self.cancel_requested && !self.gone
    }

    /// Download is offered only for completed jobs with no download in flight.
    pub fn can_download(&self) -> bool {
        self.phase() == JobPhase::Completed && !self.downloading
    }

    /// Error text from the snapshot (hidden for cancelled jobs).
    pub fn status_error(&self) -> Option<&str> {
        self.snapshot.as_ref().and_then(JobStatus::visible_error)
    }

    /// `"42%"`, or `"--"` while there is no progress data.
    pub fn progress_label(&self) -> String {
        match self.snapshot.as_ref().and_then(JobStatus::percent) {
            Some(p) => format!("{p}%"),
            None => "--".to_string(),
        }
    }
}
