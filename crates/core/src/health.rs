// crates/core/src/health.rs
//! Background liveness probe for one endpoint.

use std::sync::Arc;
use std::time::Duration;

use stemsmith_types::HealthStatus;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::JobApi;
use crate::generation::{Generation, Ticket};

/// Probes `GET /health` forever, publishing `ok`/`fail` after each probe.
///
/// Starts in `unknown`. Runs until [`HealthProber::stop`] or drop; errors
/// never leave the prober except as the tri-state.
pub struct HealthProber {
    endpoint: String,
    generation: Generation,
    wake: CancellationToken,
    rx: watch::Receiver<HealthStatus>,
    task: Option<JoinHandle<()>>,
}

impl HealthProber {
    pub fn start(api: Arc<dyn JobApi>, interval: Duration, timeout: Duration) -> Self {
        let (tx, rx) = watch::channel(HealthStatus::Unknown);
        let generation = Generation::new();
        let wake = CancellationToken::new();
        let endpoint = api.endpoint().to_string();

        let task = tokio::spawn(probe_loop(
            api,
            interval,
            timeout,
            tx,
            generation.ticket(),
            wake.clone(),
        ));
        tracing::debug!(%endpoint, interval_ms = interval.as_millis() as u64, "health prober started");

        Self {
            endpoint,
            generation,
            wake,
            rx,
            task: Some(task),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn status(&self) -> HealthStatus {
        *self.rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<HealthStatus> {
        self.rx.clone()
    }

    /// Stop probing. A probe in flight resolves into nothing.
    pub fn stop(&self) {
        if self.wake.is_cancelled() {
            return;
        }
        self.generation.advance();
        self.wake.cancel();
        tracing::debug!(endpoint = %self.endpoint, "health prober stopped");
    }

    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for HealthProber {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn probe_loop(
    api: Arc<dyn JobApi>,
    interval: Duration,
    timeout: Duration,
    tx: watch::Sender<HealthStatus>,
    ticket: Ticket,
    wake: CancellationToken,
) {
    loop {
        let status = match tokio::time::timeout(timeout, api.health()).await {
            Ok(Ok(())) => HealthStatus::Ok,
            Ok(Err(e)) => {
                tracing::debug!(endpoint = %api.endpoint(), error = %e, "health probe failed");
                HealthStatus::Fail
            }
            Err(_) => {
                tracing::debug!(endpoint = %api.endpoint(), timeout_ms = timeout.as_millis() as u64, "health probe timed out");
                HealthStatus::Fail
            }
        };
        if !ticket.is_live() {
            return;
        }
        tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            tracing::info!(endpoint = %api.endpoint(), from = %current, to = %status, "service health changed");
            *current = status;
            true
        });

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = wake.cancelled() => return,
        }
        if !ticket.is_live() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::testing::FakeApi;

    const INTERVAL: Duration = Duration::from_secs(10);

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_unknown_then_reports_ok() {
        let api = Arc::new(FakeApi::new());
        let release = api.health.push_gated(Ok(()));

        let prober = HealthProber::start(api.clone(), INTERVAL, Duration::from_secs(30));
        settle().await;
        assert_eq!(prober.status(), HealthStatus::Unknown);

        release.send(()).unwrap();
        settle().await;
        assert_eq!(prober.status(), HealthStatus::Ok);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_then_recovery() {
        let api = Arc::new(FakeApi::new());
        api.health.push(Err(ApiError::Transport("connection refused".into())));
        api.health.push(Ok(()));

        let prober = HealthProber::start(api.clone(), INTERVAL, Duration::from_secs(30));
        let mut rx = prober.subscribe();

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), HealthStatus::Fail);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), HealthStatus::Ok);
        assert_eq!(api.health.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_is_fail() {
        let api = Arc::new(FakeApi::new());
        api.health.push_delayed(Duration::from_secs(120), Ok(()));

        let prober = HealthProber::start(api.clone(), INTERVAL, Duration::from_secs(5));
        let mut rx = prober.subscribe();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), HealthStatus::Fail);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedules_after_settle_and_keeps_running() {
        let api = Arc::new(FakeApi::new());
        api.health.push(Ok(()));

        let prober = HealthProber::start(api.clone(), INTERVAL, Duration::from_secs(30));
        settle().await;
        assert_eq!(api.health.calls(), 1);

        tokio::time::sleep(INTERVAL * 3 + Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(api.health.calls(), 4);
        assert_eq!(prober.status(), HealthStatus::Ok);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_probing_and_drops_in_flight_result() {
        let api = Arc::new(FakeApi::new());
        let release = api.health.push_gated(Ok(()));

        let mut prober = HealthProber::start(api.clone(), INTERVAL, Duration::from_secs(30));
        settle().await;
        prober.stop();
        prober.stop();
        release.send(()).unwrap();
        prober.join().await;

        assert_eq!(prober.status(), HealthStatus::Unknown);
        tokio::time::sleep(INTERVAL * 5).await;
        assert_eq!(api.health.calls(), 1);
    }
}
