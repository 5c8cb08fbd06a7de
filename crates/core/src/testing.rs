// crates/core/src/testing.rs
//! Scripted in-process `JobApi` for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use stemsmith_types::{JobId, JobPhase, JobStatus};
use tokio::sync::oneshot;

use crate::api::{JobApi, SubmitRequest};
use crate::error::ApiError;

/// One scripted reply. `Gated` replies wait until the test releases them,
/// `Delayed` ones take the given (virtual) time to resolve.
pub(crate) enum Step<T> {
    Reply(Result<T, ApiError>),
    Gated(oneshot::Receiver<()>, Result<T, ApiError>),
    Delayed(Duration, Result<T, ApiError>),
}

/// Replays scripted replies in order, then repeats the last one.
pub(crate) struct Script<T: Clone> {
    steps: Mutex<VecDeque<Step<T>>>,
    last: Mutex<Option<Result<T, ApiError>>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl<T: Clone> Script<T> {
    fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn push(&self, reply: Result<T, ApiError>) {
        self.steps.lock().unwrap().push_back(Step::Reply(reply));
    }

    /// Queue a reply that resolves only once the returned sender fires.
    pub(crate) fn push_gated(&self, reply: Result<T, ApiError>) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.steps.lock().unwrap().push_back(Step::Gated(rx, reply));
        tx
    }

    pub(crate) fn push_delayed(&self, delay: Duration, reply: Result<T, ApiError>) {
        self.steps
            .lock()
            .unwrap()
            .push_back(Step::Delayed(delay, reply));
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn next(&self) -> Result<T, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let step = self.steps.lock().unwrap().pop_front();
        let reply = match step {
            Some(Step::Reply(reply)) => reply,
            Some(Step::Gated(gate, reply)) => {
                let _ = gate.await;
                reply
            }
            Some(Step::Delayed(delay, reply)) => {
                tokio::time::sleep(delay).await;
                reply
            }
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Err(ApiError::Transport("no scripted reply".into()))),
        };
        *self.last.lock().unwrap() = Some(reply.clone());

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply
    }
}

pub(crate) struct FakeApi {
    endpoint: String,
    pub(crate) submits: Script<JobId>,
    pub(crate) statuses: Script<JobStatus>,
    pub(crate) downloads: Script<Bytes>,
    pub(crate) cancels: Script<()>,
    pub(crate) health: Script<()>,
    pub(crate) submitted: Mutex<Vec<SubmitRequest>>,
}

impl FakeApi {
    pub(crate) fn new() -> Self {
        Self::with_endpoint("http://fake.test")
    }

    pub(crate) fn with_endpoint(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            submits: Script::new(),
            statuses: Script::new(),
            downloads: Script::new(),
            cancels: Script::new(),
            health: Script::new(),
            submitted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl JobApi for FakeApi {
    async fn submit(&self, request: SubmitRequest) -> Result<JobId, ApiError> {
        self.submitted.lock().unwrap().push(request);
        self.submits.next().await
    }

    async fn get_status(&self, _job_id: &str) -> Result<JobStatus, ApiError> {
        self.statuses.next().await
    }

    async fn download(&self, _job_id: &str) -> Result<Bytes, ApiError> {
        self.downloads.next().await
    }

    async fn cancel(&self, _job_id: &str) -> Result<(), ApiError> {
        self.cancels.next().await
    }

    async fn health(&self) -> Result<(), ApiError> {
        self.health.next().await
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

pub(crate) fn status(id: &str, phase: JobPhase, progress: Option<f64>) -> JobStatus {
    JobStatus {
        id: id.to_string(),
        status: phase,
        progress,
        output_location: None,
        error_message: None,
    }
}
