// crates/core/src/error.rs
use std::time::Duration;

use stemsmith_types::{JobId, JobPhase};
use thiserror::Error;

/// Errors returned by a [`crate::api::JobApi`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("invalid endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("job not found")]
    NotFound,

    #[error("{}", server_message(.status, .body))]
    Server { status: u16, body: String },

    #[error("network error: {0}")]
    Transport(String),

    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("invalid response: {0}")]
    Decode(String),
}

fn server_message(status: &u16, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("server returned status {status}")
    } else {
        body.to_string()
    }
}

impl ApiError {
    /// Build an error from a non-success response, keeping the body verbatim.
    pub async fn from_response(response: reqwest::Response) -> ApiError {
        let status = response.status().as_u16();
        if status == 404 {
            return ApiError::NotFound;
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read response body".to_string());
        ApiError::Server { status, body }
    }

    /// Whether a polling loop should keep going after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout(_) | Self::Server { .. } | Self::Decode(_)
        )
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else if e.is_timeout() {
            ApiError::Transport(format!("request timed out: {e}"))
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

/// Errors from a submission attempt.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no file selected")]
    MissingFile,

    #[error("{file_name} is not a WAV file")]
    NotWav { file_name: String },

    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid job config: {0}")]
    InvalidConfig(String),

    /// Non-success response; the server's body is the message.
    #[error("{}", server_message(.status, .body))]
    Rejected { status: u16, body: String },

    #[error("upload failed")]
    Failed { detail: String },

    #[error("tracking session closed")]
    SessionClosed,
}

/// Errors from a cancel request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CancelError {
    #[error("job {0} is not tracked")]
    UnknownJob(JobId),

    #[error("job {id} already {phase}")]
    AlreadyTerminal { id: JobId, phase: JobPhase },

    #[error("cancellation already requested for job {0}")]
    AlreadyRequested(JobId),

    #[error("job {0} is no longer known to the service")]
    Gone(JobId),

    #[error("{}", server_message(.status, .body))]
    Rejected { status: u16, body: String },

    #[error("cancel failed: {0}")]
    Transport(String),

    #[error("tracking session closed")]
    SessionClosed,
}

impl From<ApiError> for CancelError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Server { status, body } => CancelError::Rejected { status, body },
            other => CancelError::Transport(other.to_string()),
        }
    }
}

/// Errors from a download attempt.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("job {0} is not tracked")]
    UnknownJob(JobId),

    #[error("job {id} is {state}, downloads need a completed job")]
    NotReady { id: JobId, state: String },

    #[error("a download for job {0} is already in progress")]
    InFlight(JobId),

    #[error("job not found")]
    NotFound,

    #[error("{}", server_message(.status, .body))]
    Rejected { status: u16, body: String },

    #[error("download failed: {0}")]
    Transport(String),

    #[error("could not save {path}: {source}")]
    Save {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<ApiError> for DownloadError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::NotFound => DownloadError::NotFound,
            ApiError::Server { status, body } => DownloadError::Rejected { status, body },
            other => DownloadError::Transport(other.to_string()),
        }
    }
}

/// Errors from switching the service endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("invalid endpoint {url}: {reason}")]
    Invalid { url: String, reason: String },

    #[error("could not create client for {url}: {reason}")]
    Client { url: String, reason: String },
}

impl EndpointError {
    pub(crate) fn from_api(url: &str, e: ApiError) -> Self {
        match e {
            ApiError::InvalidEndpoint { url, reason } => EndpointError::Invalid { url, reason },
            other => EndpointError::Client {
                url: url.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Errors from orchestrator bookkeeping (remove/confirm).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    #[error("job {0} is not tracked")]
    UnknownJob(JobId),

    #[error(transparent)]
    Cancel(#[from] CancelError),
}
