// crates/core/src/orchestrator.rs
//! Job lifecycle orchestration.
//!
//! The orchestrator owns the tracked-job table. Every job gets its own
//! [`JobPoller`]; poll results, cancel outcomes and download state are folded
//! into the table and published to subscribers as [`JobView`]s.
//!
//! Locking: the table is a `std::sync::RwLock` held only across short,
//! non-async sections. No guard is ever held across an `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use stemsmith_types::{JobConfig, JobHandle, JobId, JobPhase, JobStatus, JobView};
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::api::ApiSlot;
use crate::config::ClientConfig;
use crate::download::{DownloadTrigger, SavedArtifact};
use crate::error::{ApiError, CancelError, DownloadError, OrchestratorError, UploadError};
use crate::generation::{Generation, Ticket};
use crate::poller::{JobPoller, PollSink};
use crate::upload::{UploadCoordinator, UploadFile};

const EVENT_CAPACITY: usize = 256;

/// Result of asking to remove a tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    /// The job may still be running remotely. Call
    /// [`Orchestrator::confirm_removal`] with the user's choice.
    ConfirmationRequired,
    Kept,
    CancelRequested,
}

/// Answer to a [`RemoveOutcome::ConfirmationRequired`] prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalChoice {
    /// Leave the job tracked.
    Keep,
    /// Cancel the remote job and keep tracking it until it settles.
    CancelJob,
    /// Stop tracking locally. The remote job keeps running.
    RemoveAnyway,
}

struct TrackedJob {
    handle: JobHandle,
    snapshot: Option<JobStatus>,
    last_error: Option<String>,
    downloading: bool,
    /// The service answered 404; polling has ended for good.
    gone: bool,
    poller: Option<JobPoller>,
    /// Unique per `track` call. Poll results carry it so a late result from
    /// a removed entry never lands on a re-tracked job with the same id.
    order: u64,
}

impl TrackedJob {
    fn view(&self) -> JobView {
        JobView::new(
            self.handle.id.clone(),
            self.snapshot.clone(),
            self.handle.cancel_requested,
            self.downloading,
            self.last_error.clone(),
        )
        .with_gone(self.gone)
    }

    fn phase(&self) -> JobPhase {
        self.snapshot.as_ref().map(|s| s.status).unwrap_or_default()
    }

    fn is_terminal(&self) -> bool {
        self.phase().is_terminal()
    }

    fn is_settled(&self) -> bool {
        self.is_terminal() || self.gone
    }
}

struct Inner {
    api: ApiSlot,
    config: ClientConfig,
    uploads: UploadCoordinator,
    jobs: RwLock<HashMap<JobId, TrackedJob>>,
    next_order: AtomicU64,
    events: broadcast::Sender<JobView>,
    session: Generation,
    session_ticket: Ticket,
    session_id: Ulid,
}

impl Inner {
    fn jobs_read(&self) -> RwLockReadGuard<'_, HashMap<JobId, TrackedJob>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("RwLock poisoned reading job table");
                poisoned.into_inner()
            }
        }
    }

    fn jobs_write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, TrackedJob>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("RwLock poisoned writing job table");
                poisoned.into_inner()
            }
        }
    }

    fn publish(&self, view: JobView) {
        // No subscribers is fine.
        let _ = self.events.send(view);
    }

    /// Apply `f` to a tracked job; publishes the new view when `f` reports
    /// a change. Returns whether it did.
    fn update<F>(&self, job_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut TrackedJob) -> bool,
    {
        let view = {
            let mut jobs = self.jobs_write();
            let Some(job) = jobs.get_mut(job_id) else {
                return false;
            };
            if !f(job) {
                return false;
            }
            job.view()
        };
        self.publish(view);
        true
    }

    fn apply_status(&self, job_id: &str, entry: u64, status: JobStatus) {
        let applied = self.update(job_id, |job| {
            // Settled jobs never move again.
            if job.order != entry || job.is_terminal() {
                return false;
            }
            job.gone = false;
            if status.is_terminal() {
                job.handle.cancel_requested = false;
            }
            job.last_error = None;
            job.snapshot = Some(status);
            true
        });
        if !applied {
            tracing::debug!(job_id, "ignoring poll result for settled or untracked job");
        }
    }

    fn apply_poll_error(&self, job_id: &str, entry: u64, error: ApiError) {
        let gone = error == ApiError::NotFound;
        self.update(job_id, |job| {
            if job.order != entry {
                return false;
            }
            if gone && !job.is_terminal() {
                job.gone = true;
                job.handle.cancel_requested = false;
            }
            job.last_error = Some(error.to_string());
            true
        });
    }
}

struct JobSink {
    inner: Weak<Inner>,
    job_id: JobId,
    entry: u64,
    ticket: Ticket,
}

impl JobSink {
    fn live(&self) -> Option<Arc<Inner>> {
        if !self.ticket.is_live() {
            return None;
        }
        self.inner.upgrade()
    }
}

impl PollSink for JobSink {
    fn on_update(&self, status: JobStatus) {
        if let Some(inner) = self.live() {
            inner.apply_status(&self.job_id, self.entry, status);
        }
    }

    fn on_error(&self, error: ApiError) {
        if let Some(inner) = self.live() {
            inner.apply_poll_error(&self.job_id, self.entry, error);
        }
    }
}

/// Clears the downloading flag when the download settles or is abandoned.
struct DownloadSlot {
    inner: Arc<Inner>,
    job_id: JobId,
    armed: bool,
}

impl DownloadSlot {
    fn finish(mut self, error: Option<String>) {
        self.armed = false;
        self.inner.update(&self.job_id, |job| {
            job.downloading = false;
            if error.is_some() {
                job.last_error = error;
            }
            true
        });
    }
}

impl Drop for DownloadSlot {
    fn drop(&mut self) {
        if self.armed {
            self.inner.update(&self.job_id, |job| {
                job.downloading = false;
                true
            });
        }
    }
}

/// Tracks submitted jobs through to completion.
///
/// Cheap to clone; clones share the same job table.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(api: ApiSlot, config: ClientConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let session = Generation::new();
        let session_ticket = session.ticket();
        let session_id = Ulid::new();
        tracing::debug!(%session_id, "tracking session opened");
        Self {
            inner: Arc::new(Inner {
                uploads: UploadCoordinator::new(api.clone()),
                api,
                config,
                jobs: RwLock::new(HashMap::new()),
                next_order: AtomicU64::new(0),
                events,
                session,
                session_ticket,
                session_id,
            }),
        }
    }

    pub fn session_id(&self) -> Ulid {
        self.inner.session_id
    }

    pub fn uploads(&self) -> &UploadCoordinator {
        &self.inner.uploads
    }

    /// Stream of job views, one per state change.
    pub fn subscribe(&self) -> broadcast::Receiver<JobView> {
        self.inner.events.subscribe()
    }

    /// Upload a file and start tracking the resulting job.
    pub async fn submit(
        &self,
        file: Option<UploadFile>,
        config: Option<&JobConfig>,
    ) -> Result<JobHandle, UploadError> {
        if !self.inner.session_ticket.is_live() {
            return Err(UploadError::SessionClosed);
        }
        let handle = self.inner.uploads.submit(file, config).await?;
        tracing::info!(session_id = %self.inner.session_id, job_id = %handle.id, "job accepted");
        if !self.track(handle.clone()) {
            if !self.inner.session_ticket.is_live() {
                tracing::warn!(job_id = %handle.id, "session closed during upload, job not tracked");
                return Err(UploadError::SessionClosed);
            }
            // Same id as a job already tracked: that entry keeps polling it.
            tracing::warn!(job_id = %handle.id, "service returned an id that is already tracked");
        }
        Ok(handle)
    }

    /// Start tracking a job and polling it immediately. Returns `false` if
    /// the job is already tracked or the session has been shut down.
    pub fn track(&self, handle: JobHandle) -> bool {
        let inner = &self.inner;
        if !inner.session_ticket.is_live() {
            tracing::warn!(job_id = %handle.id, "session closed, not tracking job");
            return false;
        }

        let view = {
            let mut jobs = inner.jobs_write();
            if jobs.contains_key(&handle.id) {
                tracing::debug!(job_id = %handle.id, "job already tracked");
                return false;
            }
            let job_id = handle.id.clone();
            let order = inner.next_order.fetch_add(1, Ordering::Relaxed);
            let mut poller = JobPoller::new(
                job_id.clone(),
                inner.api.clone(),
                inner.config.poll_interval,
                inner.config.request_timeout,
            );
            let sink = JobSink {
                inner: Arc::downgrade(inner),
                job_id: job_id.clone(),
                entry: order,
                ticket: inner.session.ticket(),
            };
            let job = TrackedJob {
                handle,
                snapshot: None,
                last_error: None,
                downloading: false,
                gone: false,
                poller: None,
                order,
            };
            let view = job.view();
            // Started under the lock so the first result always finds the entry.
            poller.start(sink);
            jobs.insert(
                job_id,
                TrackedJob {
                    poller: Some(poller),
                    ..job
                },
            );
            view
        };
        tracing::info!(session_id = %inner.session_id, job_id = %view.id, "tracking job");
        inner.publish(view);
        true
    }

    pub fn view(&self, job_id: &str) -> Option<JobView> {
        self.inner.jobs_read().get(job_id).map(TrackedJob::view)
    }

    /// Tracked jobs, newest first.
    pub fn jobs(&self) -> Vec<JobView> {
        let jobs = self.inner.jobs_read();
        let mut tracked: Vec<&TrackedJob> = jobs.values().collect();
        tracked.sort_by(|a, b| b.order.cmp(&a.order));
        tracked.into_iter().map(TrackedJob::view).collect()
    }

    /// Ask the service to cancel a job.
    ///
    /// The job shows as cancelling from the moment the request is issued
    /// until a terminal status arrives. A failed request clears the overlay
    /// and records the error on the job. A job the service no longer knows
    /// counts as cancelled.
    pub async fn request_cancel(&self, job_id: &str) -> Result<(), CancelError> {
        let inner = &self.inner;
        let view = {
            let mut jobs = inner.jobs_write();
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| CancelError::UnknownJob(job_id.to_string()))?;
            if job.is_terminal() {
                return Err(CancelError::AlreadyTerminal {
                    id: job_id.to_string(),
                    phase: job.phase(),
                });
            }
            if job.gone {
                return Err(CancelError::Gone(job_id.to_string()));
            }
            if job.handle.cancel_requested {
                return Err(CancelError::AlreadyRequested(job_id.to_string()));
            }
            job.handle.cancel_requested = true;
            job.view()
        };
        inner.publish(view);

        let ticket = inner.session.ticket();
        let api = inner.api.current();
        let timeout = inner.config.request_timeout;
        let result = match tokio::time::timeout(timeout, api.cancel(job_id)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(timeout)),
        };
        if !ticket.is_live() {
            return Err(CancelError::SessionClosed);
        }

        match result {
            Ok(()) | Err(ApiError::NotFound) => {
                tracing::info!(session_id = %inner.session_id, job_id, endpoint = %api.endpoint(), "cancel acknowledged");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session_id = %inner.session_id, job_id, endpoint = %api.endpoint(), error = %e, "cancel failed");
                let err = CancelError::from(e);
                let message = err.to_string();
                inner.update(job_id, |job| {
                    if !job.is_terminal() {
                        job.handle.cancel_requested = false;
                    }
                    job.last_error = Some(message);
                    true
                });
                Err(err)
            }
        }
    }

    /// Remove a job from the tracked set. Settled jobs and jobs the service
    /// no longer knows go immediately; anything else needs
    /// [`Orchestrator::confirm_removal`].
    pub fn remove(&self, job_id: &str) -> Result<RemoveOutcome, OrchestratorError> {
        let removed = {
            let mut jobs = self.inner.jobs_write();
            let job = jobs
                .get(job_id)
                .ok_or_else(|| OrchestratorError::UnknownJob(job_id.to_string()))?;
            if !job.is_settled() {
                return Ok(RemoveOutcome::ConfirmationRequired);
            }
            jobs.remove(job_id)
        };
        drop(removed);
        tracing::debug!(job_id, "removed settled job");
        Ok(RemoveOutcome::Removed)
    }

    pub async fn confirm_removal(
        &self,
        job_id: &str,
        choice: RemovalChoice,
    ) -> Result<RemoveOutcome, OrchestratorError> {
        if !self.inner.jobs_read().contains_key(job_id) {
            return Err(OrchestratorError::UnknownJob(job_id.to_string()));
        }
        match choice {
            RemovalChoice::Keep => Ok(RemoveOutcome::Kept),
            RemovalChoice::CancelJob => {
                match self.request_cancel(job_id).await {
                    Ok(()) | Err(CancelError::AlreadyRequested(_)) => {}
                    // Settled while the prompt was open: nothing left to stop.
                    Err(CancelError::AlreadyTerminal { .. } | CancelError::Gone(_)) => {
                        return self.remove(job_id)
                    }
                    Err(e) => return Err(e.into()),
                }
                Ok(RemoveOutcome::CancelRequested)
            }
            RemovalChoice::RemoveAnyway => {
                let removed = self.inner.jobs_write().remove(job_id);
                if removed.is_some() {
                    tracing::warn!(job_id, "stopped tracking a job that may still be running");
                }
                Ok(RemoveOutcome::Removed)
            }
        }
    }

    /// Download a completed job's artifact through `trigger`.
    ///
    /// Rejected unless the last known status is `completed`, and while
    /// another download of the same job is in flight.
    pub async fn download(
        &self,
        job_id: &str,
        trigger: &DownloadTrigger,
    ) -> Result<SavedArtifact, DownloadError> {
        let inner = &self.inner;
        let view = {
            let mut jobs = inner.jobs_write();
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| DownloadError::UnknownJob(job_id.to_string()))?;
            if job.phase() != JobPhase::Completed {
                return Err(DownloadError::NotReady {
                    id: job_id.to_string(),
                    state: job.view().state.label().to_string(),
                });
            }
            if job.downloading {
                return Err(DownloadError::InFlight(job_id.to_string()));
            }
            job.downloading = true;
            job.view()
        };
        inner.publish(view);
        let slot = DownloadSlot {
            inner: Arc::clone(inner),
            job_id: job_id.to_string(),
            armed: true,
        };

        let api = inner.api.current();
        let result = trigger.fetch_and_save(api.as_ref(), job_id).await;
        slot.finish(result.as_ref().err().map(ToString::to_string));
        result
    }

    /// End the tracking session: stop every poller and drop any result
    /// still in flight. Tracked jobs stay readable.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        if !inner.session_ticket.is_live() {
            return;
        }
        inner.session.advance();
        let mut jobs = inner.jobs_write();
        for job in jobs.values_mut() {
            if let Some(poller) = job.poller.take() {
                poller.stop();
            }
        }
        tracing::debug!(session_id = %inner.session_id, jobs = jobs.len(), "tracking session closed");
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("session_id", &self.inner.session_id)
            .field("api", &self.inner.api)
            .finish_non_exhaustive()
    }
}
