//! Application context: the registry, history, probe engine and scheduler
//! wired together, plus persistence of the endpoint list.

use crate::config::MonitorConfig;
use crate::endpoint_manager::{EndpointRegistry, SharedEndpoints};
use crate::history::{HistoryStore, SharedHistory};
use crate::persistence::{default_seed_endpoints, EndpointStore};
use crate::probe::Prober;
use crate::query::{NativeQuery, QueryClient};
use crate::scheduler::{PeriodicHandle, RefreshReport, RefreshScheduler};
use log::{info, warn};
use shared::{Endpoint, EndpointKey, MonitorError, StatusSnapshot};
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct MonitorContext {
    config: MonitorConfig,
    endpoints: SharedEndpoints,
    history: SharedHistory,
    scheduler: RefreshScheduler,
    store: Arc<dyn EndpointStore>,
}

impl MonitorContext {
    /// Builds a context speaking the native wire protocols.
    pub async fn with_native_queries(config: MonitorConfig, store: Arc<dyn EndpointStore>) -> Self {
        Self::bootstrap(config, store, Arc::new(NativeQuery::new())).await
    }

    /// Loads the persisted endpoint list, seeding the defaults when nothing
    /// was saved. Entries that fail validation are skipped with a warning.
    pub async fn bootstrap(
        config: MonitorConfig,
        store: Arc<dyn EndpointStore>,
        client: Arc<dyn QueryClient>,
    ) -> Self {
        let history = HistoryStore::shared();
        let mut registry = EndpointRegistry::new(Arc::clone(&history));

        let mut stored = match store.load().await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                warn!("Could not load endpoint list: {}", e);
                Vec::new()
            }
        };
        if stored.is_empty() {
            info!("No saved endpoints, starting with the defaults");
            stored = default_seed_endpoints();
        }
        for endpoint in stored {
            if let Err(e) = registry.restore(endpoint).await {
                warn!("Skipping saved endpoint: {}", e);
            }
        }

        let endpoints = Arc::new(RwLock::new(registry));
        let prober = Arc::new(Prober::new(client, config.timeouts));
        let scheduler = RefreshScheduler::new(
            Arc::clone(&endpoints),
            Arc::clone(&history),
            prober,
            config.inter_probe_delay,
        );

        Self {
            config,
            endpoints,
            history,
            scheduler,
            store,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    /// Adds an endpoint, saves the list and probes the new endpoint once.
    pub async fn add_endpoint(
        &self,
        host: &str,
        port: u32,
        display_name: Option<String>,
    ) -> Result<(Endpoint, Option<StatusSnapshot>), MonitorError> {
        let endpoint = self
            .endpoints
            .write()
            .await
            .add(host, port, display_name)
            .await?;
        self.persist().await;

        let snapshot = self.scheduler.refresh_one(&endpoint.key()).await;
        Ok((endpoint, snapshot))
    }

    /// Removes an endpoint with its history. Unknown keys are a no-op and do
    /// not touch the saved list.
    pub async fn remove_endpoint(&self, key: &EndpointKey) -> Option<Endpoint> {
        let removed = self.endpoints.write().await.remove(key).await;
        if removed.is_some() {
            self.persist().await;
        }
        removed
    }

    pub async fn endpoints(&self) -> Vec<Endpoint> {
        self.endpoints.read().await.list()
    }

    pub async fn history(&self, key: &EndpointKey) -> Vec<StatusSnapshot> {
        self.history.read().await.get(key)
    }

    pub async fn latest(&self, key: &EndpointKey) -> Option<StatusSnapshot> {
        self.history.read().await.latest(key)
    }

    pub async fn player_series(&self, key: &EndpointKey) -> Vec<u32> {
        self.history.read().await.player_series(key)
    }

    pub async fn online_ratio(&self, key: &EndpointKey) -> Option<f64> {
        self.history.read().await.online_ratio(key)
    }

    pub async fn refresh_all(&self) -> RefreshReport {
        self.scheduler.refresh_all().await
    }

    pub fn start_periodic(&self) -> PeriodicHandle {
        self.scheduler.start_periodic(self.config.refresh_interval)
    }

    // A failed save keeps the in-memory list; the next change retries.
    async fn persist(&self) {
        let endpoints = self.endpoints.read().await.list();
        if let Err(e) = self.store.save(&endpoints).await {
            warn!("Could not save endpoint list: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeTimeouts;
    use crate::persistence::PersistenceError;
    use crate::query::{QueryError, QueryResponse};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct MemoryStore {
        saved: Mutex<Vec<Endpoint>>,
        saves: Mutex<usize>,
        broken: bool,
    }

    #[async_trait]
    impl EndpointStore for MemoryStore {
        async fn load(&self) -> Result<Vec<Endpoint>, PersistenceError> {
            if self.broken {
                return Err(PersistenceError::Io(std::io::Error::other("disk gone")));
            }
            Ok(self.saved.lock().unwrap().clone())
        }

        async fn save(&self, endpoints: &[Endpoint]) -> Result<(), PersistenceError> {
            *self.saved.lock().unwrap() = endpoints.to_vec();
            *self.saves.lock().unwrap() += 1;
            Ok(())
        }
    }

    struct AlwaysMinecraft;

    #[async_trait]
    impl QueryClient for AlwaysMinecraft {
        async fn query(
            &self,
            _protocol: &str,
            _host: &str,
            _port: u16,
            _timeout: Duration,
        ) -> Result<QueryResponse, QueryError> {
            Ok(QueryResponse {
                players: 3,
                max_players: 8,
                ..QueryResponse::default()
            })
        }
    }

    fn config() -> MonitorConfig {
        MonitorConfig {
            inter_probe_delay: Duration::ZERO,
            timeouts: ProbeTimeouts::uniform(Duration::from_millis(300)),
            ..MonitorConfig::default()
        }
    }

    async fn context(store: Arc<MemoryStore>) -> MonitorContext {
        MonitorContext::bootstrap(config(), store, Arc::new(AlwaysMinecraft)).await
    }

    #[tokio::test]
    async fn test_bootstrap_seeds_defaults() {
        let store = Arc::new(MemoryStore::default());
        let context = context(Arc::clone(&store)).await;

        let endpoints = context.endpoints().await;
        assert_eq!(endpoints, default_seed_endpoints());
        // Seeds are not written back until the list changes.
        assert_eq!(*store.saves.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_load_failure_seeds_defaults() {
        let store = Arc::new(MemoryStore {
            broken: true,
            ..MemoryStore::default()
        });
        let context = context(store).await;
        assert_eq!(context.endpoints().await.len(), 3);
    }

    #[tokio::test]
    async fn test_bootstrap_restores_saved_list() {
        let store = Arc::new(MemoryStore::default());
        *store.saved.lock().unwrap() = vec![
            Endpoint::new("play.example.org", 25565, "Survival"),
            Endpoint::new("", 25565, "broken"),
            Endpoint::new("play.example.org", 25565, "duplicate"),
        ];

        let context = context(store).await;
        let endpoints = context.endpoints().await;
        assert_eq!(endpoints, vec![Endpoint::new("play.example.org", 25565, "Survival")]);
        assert!(context.history(&endpoints[0].key()).await.is_empty());
    }

    #[tokio::test]
    async fn test_add_endpoint_saves_and_probes() {
        let store = Arc::new(MemoryStore::default());
        let context = context(Arc::clone(&store)).await;

        let (endpoint, snapshot) = context.add_endpoint("127.0.0.1", 25565, None).await.unwrap();

        assert_eq!(endpoint.display_name, "Minecraft - 127.0.0.1");
        assert_eq!(snapshot.unwrap().occupancy(), "3/8");
        assert_eq!(context.history(&endpoint.key()).await.len(), 1);
        assert_eq!(context.player_series(&endpoint.key()).await, vec![3]);
        assert_eq!(store.saved.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_add_invalid_endpoint_does_not_save() {
        let store = Arc::new(MemoryStore::default());
        let context = context(Arc::clone(&store)).await;

        let result = context.add_endpoint("google.com", 80, None).await;
        assert!(matches!(result, Err(MonitorError::InvalidInput(_))));
        assert_eq!(*store.saves.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remove_endpoint() {
        let store = Arc::new(MemoryStore::default());
        let context = context(Arc::clone(&store)).await;
        let key = EndpointKey::new("google.com", 80);

        assert!(context.remove_endpoint(&key).await.is_some());
        assert!(context.latest(&key).await.is_none());
        assert_eq!(store.saved.lock().unwrap().len(), 2);

        assert!(context.remove_endpoint(&key).await.is_none());
        assert_eq!(*store.saves.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_refresh_all_fills_history() {
        let context = context(Arc::new(MemoryStore::default())).await;

        let report = context.refresh_all().await;
        assert_eq!(report.probed, 3);

        for endpoint in context.endpoints().await {
            let latest = context.latest(&endpoint.key()).await.unwrap();
            assert!(latest.online);
            assert_eq!(context.online_ratio(&endpoint.key()).await, Some(1.0));
        }
    }
}
