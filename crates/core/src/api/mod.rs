// crates/core/src/api/mod.rs
//! Contract with the remote separation service.
//!
//! - `JobApi`: the five operations the client relies on
//! - `HttpJobApi`: reqwest implementation against a base URL
//! - `ApiSlot`: the currently selected endpoint, swappable at runtime

pub mod http;

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use stemsmith_types::{JobId, JobStatus};

use crate::error::ApiError;

pub use http::HttpJobApi;

/// Audio part of a submission, already normalised for the service.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    /// Part filename, always ending in `.wav`.
    pub file_name: String,
    pub bytes: Bytes,
    /// JSON-encoded [`stemsmith_types::JobConfig`], sent as the `config` part.
    pub config_json: Option<String>,
}

/// Remote job operations.
///
/// Implementations include:
/// - `HttpJobApi`: talks to a running service over HTTP
/// - test fakes scripting replies in-process
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Upload audio plus optional config; returns the new job id.
    async fn submit(&self, request: SubmitRequest) -> Result<JobId, ApiError>;

    /// Fetch the latest status. A missing job is `ApiError::NotFound`.
    async fn get_status(&self, job_id: &str) -> Result<JobStatus, ApiError>;

    /// Fetch the packaged result of a completed job.
    async fn download(&self, job_id: &str) -> Result<Bytes, ApiError>;

    /// Ask the service to stop a job. A missing job is `ApiError::NotFound`.
    async fn cancel(&self, job_id: &str) -> Result<(), ApiError>;

    /// Liveness probe.
    async fn health(&self) -> Result<(), ApiError>;

    /// Endpoint this client talks to, for logging.
    fn endpoint(&self) -> &str;
}

/// Shared, swappable handle to the active [`JobApi`].
///
/// Each operation takes a clone of the current API when it is issued, so
/// swapping the endpoint never redirects a request already in flight.
#[derive(Clone)]
pub struct ApiSlot {
    current: Arc<RwLock<Arc<dyn JobApi>>>,
}

impl ApiSlot {
    pub fn new(api: Arc<dyn JobApi>) -> Self {
        Self {
            current: Arc::new(RwLock::new(api)),
        }
    }

    /// The API new operations should use.
    pub fn current(&self) -> Arc<dyn JobApi> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => {
                tracing::error!("RwLock poisoned reading api slot");
                Arc::clone(&poisoned.into_inner())
            }
        }
    }

    /// Point later operations at a different API.
    pub fn replace(&self, api: Arc<dyn JobApi>) {
        tracing::info!(endpoint = %api.endpoint(), "switching job api endpoint");
        match self.current.write() {
            Ok(mut guard) => *guard = api,
            Err(poisoned) => {
                tracing::error!("RwLock poisoned writing api slot");
                *poisoned.into_inner() = api;
            }
        }
    }
}

impl std::fmt::Debug for ApiSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiSlot")
            .field("endpoint", &self.current().endpoint())
            .finish()
    }
}
