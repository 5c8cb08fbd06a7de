// crates/core/src/poller.rs
//! Per-job status polling loop.
//!
//! One fetch at a time: the next fetch is scheduled `interval` after the
//! previous one settles, never on a fixed-rate timer. The loop ends by itself
//! on a terminal status or a not-found reply, or when [`JobPoller::stop`] is
//! called.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stemsmith_types::{JobId, JobStatus};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::ApiSlot;
use crate::error::ApiError;
use crate::generation::{Generation, Ticket};

/// Receives the results of a poll loop, in fetch order.
pub trait PollSink: Send + Sync + 'static {
    fn on_update(&self, status: JobStatus);

    /// Recoverable errors keep the loop running; `ApiError::NotFound` is the
    /// last thing a loop ever reports.
    fn on_error(&self, error: ApiError);
}

/// Poll results as channel messages.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    Update(JobStatus),
    Error(ApiError),
}

impl PollSink for mpsc::UnboundedSender<PollEvent> {
    fn on_update(&self, status: JobStatus) {
        let _ = self.send(PollEvent::Update(status));
    }

    fn on_error(&self, error: ApiError) {
        let _ = self.send(PollEvent::Error(error));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle = 0,
    Polling = 1,
    Stopped = 2,
}

impl PollerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Polling,
            _ => Self::Stopped,
        }
    }
}

/// Repeating fetch-and-report loop for one job.
///
/// A poller runs at most once: create a fresh one per tracking session.
pub struct JobPoller {
    job_id: JobId,
    api: ApiSlot,
    interval: Duration,
    request_timeout: Duration,
    generation: Generation,
    state: Arc<AtomicU8>,
    wake: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl JobPoller {
    pub fn new(
        job_id: impl Into<JobId>,
        api: ApiSlot,
        interval: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            api,
            interval,
            request_timeout,
            generation: Generation::new(),
            state: Arc::new(AtomicU8::new(PollerState::Idle as u8)),
            wake: CancellationToken::new(),
            task: None,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn state(&self) -> PollerState {
        PollerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Fetch immediately, then keep polling. Returns `false` (and does
    /// nothing) unless the poller is still idle.
    pub fn start<S: PollSink>(&mut self, sink: S) -> bool {
        if self
            .state
            .compare_exchange(
                PollerState::Idle as u8,
                PollerState::Polling as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            tracing::warn!(job_id = %self.job_id, state = ?self.state(), "poller already used, ignoring start");
            return false;
        }

        let run = PollLoop {
            job_id: self.job_id.clone(),
            api: self.api.clone(),
            interval: self.interval,
            request_timeout: self.request_timeout,
            ticket: self.generation.ticket(),
            wake: self.wake.clone(),
            state: Arc::clone(&self.state),
        };
        tracing::debug!(job_id = %self.job_id, interval_ms = self.interval.as_millis() as u64, "poller started");
        self.task = Some(tokio::spawn(run.run(sink)));
        true
    }

    /// Stop polling. Safe to call any number of times, before or after the
    /// loop ended on its own. A fetch already in flight is left to resolve
    /// and its result is dropped.
    pub fn stop(&self) {
        let previous = self.state.swap(PollerState::Stopped as u8, Ordering::AcqRel);
        if previous == PollerState::Stopped as u8 {
            return;
        }
        self.generation.advance();
        self.wake.cancel();
        tracing::debug!(job_id = %self.job_id, "poller stopped");
    }

    /// Wait for the loop task to exit.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for JobPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

struct PollLoop {
    job_id: JobId,
    api: ApiSlot,
    interval: Duration,
    request_timeout: Duration,
    ticket: Ticket,
    wake: CancellationToken,
    state: Arc<AtomicU8>,
}

impl PollLoop {
    async fn run<S: PollSink>(self, sink: S) {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            // Endpoint is captured per fetch.
            let api = self.api.current();
            let result =
                match tokio::time::timeout(self.request_timeout, api.get_status(&self.job_id)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(ApiError::Timeout(self.request_timeout)),
                };

            if !self.ticket.is_live() {
                tracing::debug!(job_id = %self.job_id, attempt, "discarding poll result after stop");
                return;
            }

            match result {
                Ok(status) => {
                    let phase = status.status;
                    let terminal = status.is_terminal();
                    tracing::trace!(job_id = %self.job_id, attempt, %phase, progress = ?status.progress, "poll update");
                    sink.on_update(status);
                    if terminal {
                        tracing::info!(job_id = %self.job_id, attempt, %phase, "job reached terminal state");
                        self.finish();
                        return;
                    }
                }
                Err(ApiError::NotFound) => {
                    tracing::warn!(job_id = %self.job_id, attempt, "job not found, polling stopped");
                    sink.on_error(ApiError::NotFound);
                    self.finish();
                    return;
                }
                Err(e) => {
                    tracing::warn!(job_id = %self.job_id, attempt, endpoint = %api.endpoint(), error = %e, "poll failed, will retry");
                    sink.on_error(e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.wake.cancelled() => return,
            }
            if !self.ticket.is_live() {
                return;
            }
        }
    }

    fn finish(&self) {
        self.state.store(PollerState::Stopped as u8, Ordering::Release);
    }
}
