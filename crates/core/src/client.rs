// crates/core/src/client.rs
//! Client facade: endpoint selection, job tracking and health in one place.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use stemsmith_types::HealthStatus;
use tokio::sync::watch;

use crate::api::{ApiSlot, HttpJobApi, JobApi};
use crate::config::{resolve_endpoint, ClientConfig, ENV_ENDPOINT};
use crate::endpoint::EndpointStore;
use crate::error::{ApiError, EndpointError};
use crate::health::HealthProber;
use crate::orchestrator::Orchestrator;

type Connector = dyn Fn(&str, Duration) -> Result<Arc<dyn JobApi>, ApiError> + Send + Sync;

fn http_connector(url: &str, timeout: Duration) -> Result<Arc<dyn JobApi>, ApiError> {
    Ok(Arc::new(HttpJobApi::new(url, timeout)?))
}

pub struct StemsmithClient {
    config: ClientConfig,
    store: EndpointStore,
    connector: Arc<Connector>,
    api: ApiSlot,
    orchestrator: Orchestrator,
    prober: Mutex<Option<HealthProber>>,
}

impl StemsmithClient {
    /// Connect over HTTP. The endpoint is `explicit`, else `STEMSMITH_ENDPOINT`,
    /// else the last one saved in `store`. An explicit endpoint is saved.
    pub fn connect(
        config: ClientConfig,
        store: EndpointStore,
        explicit: Option<&str>,
    ) -> Result<Self, EndpointError> {
        let endpoint = resolve_endpoint(
            explicit,
            std::env::var(ENV_ENDPOINT).ok(),
            store.load_or_default(),
        );
        let client = Self::with_connector(config, store, &endpoint, http_connector)?;
        if explicit.is_some_and(|e| !e.trim().is_empty()) {
            client.store.save(&client.endpoint());
        }
        Ok(client)
    }

    /// Build with a custom way of turning an endpoint into a [`JobApi`].
    pub fn with_connector<C>(
        config: ClientConfig,
        store: EndpointStore,
        endpoint: &str,
        connector: C,
    ) -> Result<Self, EndpointError>
    where
        C: Fn(&str, Duration) -> Result<Arc<dyn JobApi>, ApiError> + Send + Sync + 'static,
    {
        let api = connector(endpoint, config.request_timeout)
            .map_err(|e| EndpointError::from_api(endpoint, e))?;
        let api = ApiSlot::new(api);
        Ok(Self {
            orchestrator: Orchestrator::new(api.clone(), config),
            config,
            store,
            connector: Arc::new(connector),
            api,
            prober: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn endpoint(&self) -> String {
        self.api.current().endpoint().to_string()
    }

    /// Point later operations at `url` and remember it. Requests already in
    /// flight finish against the old endpoint. A running health prober is
    /// restarted against the new one.
    pub fn set_endpoint(&self, url: &str) -> Result<(), EndpointError> {
        let api = (self.connector)(url, self.config.request_timeout)
            .map_err(|e| EndpointError::from_api(url, e))?;
        let endpoint = api.endpoint().to_string();
        self.api.replace(api);
        self.store.save(&endpoint);

        let mut prober = self.prober_lock();
        if prober.is_some() {
            *prober = Some(self.spawn_prober());
        }
        Ok(())
    }

    /// Start probing the current endpoint in the background. No-op if
    /// already running.
    pub fn start_health(&self) -> watch::Receiver<HealthStatus> {
        let mut prober = self.prober_lock();
        match prober.as_ref() {
            Some(running) => running.subscribe(),
            None => {
                let started = self.spawn_prober();
                let rx = started.subscribe();
                *prober = Some(started);
                rx
            }
        }
    }

    /// Latest background health reading, `unknown` if not probing.
    pub fn health(&self) -> HealthStatus {
        self.prober_lock()
            .as_ref()
            .map(HealthProber::status)
            .unwrap_or_default()
    }

    /// One probe of the current endpoint.
    pub async fn check_health(&self) -> HealthStatus {
        let api = self.api.current();
        match tokio::time::timeout(self.config.request_timeout, api.health()).await {
            Ok(Ok(())) => HealthStatus::Ok,
            Ok(Err(e)) => {
                tracing::debug!(endpoint = %api.endpoint(), error = %e, "health check failed");
                HealthStatus::Fail
            }
            Err(_) => HealthStatus::Fail,
        }
    }

    /// Stop the prober and every poller.
    pub fn shutdown(&self) {
        if let Some(prober) = self.prober_lock().take() {
            prober.stop();
        }
        self.orchestrator.shutdown();
    }

    fn spawn_prober(&self) -> HealthProber {
        HealthProber::start(
            self.api.current(),
            self.config.health_interval,
            self.config.request_timeout,
        )
    }

    fn prober_lock(&self) -> MutexGuard<'_, Option<HealthProber>> {
        match self.prober.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Mutex poisoned on health prober");
                poisoned.into_inner()
            }
        }
    }
}

impl Drop for StemsmithClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for StemsmithClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StemsmithClient")
            .field("endpoint", &self.endpoint())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::http::normalize_base_url;
    use crate::testing::FakeApi;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    /// Hands out one scripted fake per endpoint.
    fn fakes(
        endpoints: &[&str],
    ) -> (
        HashMap<String, Arc<FakeApi>>,
        impl Fn(&str, Duration) -> Result<Arc<dyn JobApi>, ApiError> + Send + Sync + 'static,
    ) {
        let map: HashMap<String, Arc<FakeApi>> = endpoints
            .iter()
            .map(|e| (e.to_string(), Arc::new(FakeApi::with_endpoint(e))))
            .collect();
        let lookup = map.clone();
        let connector = move |url: &str, _timeout: Duration| -> Result<Arc<dyn JobApi>, ApiError> {
            let url = normalize_base_url(url)?;
            let api: Arc<dyn JobApi> = lookup
                .get(&url)
                .cloned()
                .ok_or_else(|| ApiError::Transport(format!("no fake for {url}")))?;
            Ok(api)
        };
        (map, connector)
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_endpoint_persists_and_swaps_api() {
        let (apis, connector) = fakes(&["http://a:1", "http://b:2"]);
        let store = EndpointStore::in_memory(None);
        let client =
            StemsmithClient::with_connector(ClientConfig::default(), store.clone(), "http://a:1", connector)
                .unwrap();
        assert_eq!(client.endpoint(), "http://a:1");

        client.set_endpoint("http://b:2/").unwrap();
        assert_eq!(client.endpoint(), "http://b:2");
        assert_eq!(store.load_or_default(), "http://b:2");

        apis["http://b:2"].health.push(Ok(()));
        assert_eq!(client.check_health().await, HealthStatus::Ok);
        assert_eq!(apis["http://a:1"].health.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_endpoint_is_rejected_and_nothing_changes() {
        let (_apis, connector) = fakes(&["http://a:1"]);
        let store = EndpointStore::in_memory(None);
        let client =
            StemsmithClient::with_connector(ClientConfig::default(), store.clone(), "http://a:1", connector)
                .unwrap();

        let err = client.set_endpoint("not a url").unwrap_err();
        assert!(matches!(err, EndpointError::Invalid { .. }));
        assert_eq!(client.endpoint(), "http://a:1");
        assert_eq!(store.load_or_default(), crate::endpoint::DEFAULT_ENDPOINT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_endpoint_change_restarts_prober() {
        let (apis, connector) = fakes(&["http://a:1", "http://b:2"]);
        apis["http://a:1"].health.push(Err(ApiError::Transport("down".into())));
        apis["http://b:2"].health.push(Ok(()));
        let client = StemsmithClient::with_connector(
            ClientConfig::default(),
            EndpointStore::in_memory(None),
            "http://a:1",
            connector,
        )
        .unwrap();

        let mut rx = client.start_health();
        rx.changed().await.unwrap();
        assert_eq!(client.health(), HealthStatus::Fail);

        client.set_endpoint("http://b:2").unwrap();
        let mut rx = client.start_health();
        rx.changed().await.unwrap();
        assert_eq!(client.health(), HealthStatus::Ok);

        let a_calls = apis["http://a:1"].health.calls();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(apis["http://a:1"].health.calls(), a_calls);
        client.shutdown();
        assert_eq!(client.health(), HealthStatus::Unknown);
    }
}
