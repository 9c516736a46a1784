//! Bounded per-endpoint history of status snapshots.
//!
//! Each endpoint keeps at most [`HISTORY_CAPACITY`] snapshots in insertion
//! order; recording past capacity evicts the oldest. The store is shared as
//! [`SharedHistory`] so that a reader holding the lock never sees a sequence
//! in the middle of an append.

use shared::{EndpointKey, StatusSnapshot, HISTORY_CAPACITY};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

pub type SharedHistory = Arc<RwLock<HistoryStore>>;

#[derive(Debug, Default)]
pub struct HistoryStore {
    records: HashMap<EndpointKey, VecDeque<StatusSnapshot>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedHistory {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Creates an empty record for `key` unless one exists.
    pub fn register(&mut self, key: EndpointKey) {
        self.records.entry(key).or_default();
    }

    /// Appends `snapshot`, evicting from the head beyond capacity.
    pub fn record(&mut self, key: &EndpointKey, snapshot: StatusSnapshot) {
        let history = self
            .records
            .entry(key.clone())
            .or_insert_with(|| VecDeque::with_capacity(HISTORY_CAPACITY + 1));
        history.push_back(snapshot);
        while history.len() > HISTORY_CAPACITY {
            history.pop_front();
        }
    }

    /// Retained snapshots, oldest first. Empty for unknown keys.
    pub fn get(&self, key: &EndpointKey) -> Vec<StatusSnapshot> {
        self.records
            .get(key)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self, key: &EndpointKey) -> Option<StatusSnapshot> {
        self.records.get(key).and_then(|history| history.back().cloned())
    }

    /// Forgets everything recorded for `key`.
    pub fn drop_history(&mut self, key: &EndpointKey) {
        self.records.remove(key);
    }

    /// Player counts oldest first, the series a trend chart plots.
    pub fn player_series(&self, key: &EndpointKey) -> Vec<u32> {
        self.records
            .get(key)
            .map(|history| history.iter().map(|s| s.players).collect())
            .unwrap_or_default()
    }

    /// Share of retained snapshots that were online, `None` without history.
    pub fn online_ratio(&self, key: &EndpointKey) -> Option<f64> {
        let history = self.records.get(key).filter(|h| !h.is_empty())?;
        let online = history.iter().filter(|s| s.online).count();
        Some(online as f64 / history.len() as f64)
    }

    pub fn contains(&self, key: &EndpointKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn len(&self, key: &EndpointKey) -> usize {
        self.records.get(key).map_or(0, VecDeque::len)
    }

    /// Number of endpoints with a record.
    pub fn tracked(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::time::Duration;

    fn key() -> EndpointKey {
        EndpointKey::new("mc.example.net", 25565)
    }

    /// Offline snapshots tagged through their response time so order is visible.
    fn snapshot(tag: u64, online: bool) -> StatusSnapshot {
        if online {
            StatusSnapshot::reachable("Minecraft", "10.0.0.1", Duration::from_millis(tag))
        } else {
            StatusSnapshot::offline("Minecraft", "10.0.0.1", Duration::from_millis(tag), "down")
        }
    }

    #[test]
    fn test_register_creates_empty_record() {
        let mut store = HistoryStore::new();
        store.register(key());

        assert!(store.contains(&key()));
        assert!(store.get(&key()).is_empty());
        assert_eq!(store.tracked(), 1);
    }

    #[test]
    fn test_register_keeps_existing_history() {
        let mut store = HistoryStore::new();
        store.record(&key(), snapshot(1, true));
        store.register(key());

        assert_eq!(store.len(&key()), 1);
    }

    #[test]
    fn test_record_without_register() {
        let mut store = HistoryStore::new();
        store.record(&key(), snapshot(1, true));

        assert_eq!(store.len(&key()), 1);
        assert_eq!(store.latest(&key()).unwrap().response_time_ms, 1);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut store = HistoryStore::new();
        for tag in 1..=15 {
            store.record(&key(), snapshot(tag, true));
            assert!(store.len(&key()) <= HISTORY_CAPACITY);
        }

        let tags: Vec<u32> = store.get(&key()).iter().map(|s| s.response_time_ms).collect();
        assert_eq!(tags, (6..=15).collect::<Vec<u32>>());
    }

    #[test]
    fn test_get_unknown_key_is_empty() {
        let store = HistoryStore::new();
        assert!(store.get(&key()).is_empty());
        assert!(store.latest(&key()).is_none());
        assert!(store.online_ratio(&key()).is_none());
    }

    #[test]
    fn test_drop_history() {
        let mut store = HistoryStore::new();
        let other = EndpointKey::new("mc.example.net", 25566);
        store.record(&key(), snapshot(1, true));
        store.record(&other, snapshot(2, true));

        store.drop_history(&key());

        assert!(!store.contains(&key()));
        assert_eq!(store.len(&other), 1);

        // Dropping twice is harmless.
        store.drop_history(&key());
        assert_eq!(store.tracked(), 1);
    }

    #[test]
    fn test_online_ratio_and_series() {
        let mut store = HistoryStore::new();
        store.record(&key(), snapshot(1, true));
        store.record(&key(), snapshot(2, false));
        store.record(&key(), snapshot(3, true));
        store.record(&key(), snapshot(4, true));

        assert_approx_eq!(store.online_ratio(&key()).unwrap(), 0.75, 1e-9);
        assert_eq!(store.player_series(&key()), vec![0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_shared_store_concurrent_appends() {
        let history = HistoryStore::shared();
        let mut handles = Vec::new();

        for task in 0..8u64 {
            let history = Arc::clone(&history);
            handles.push(tokio::spawn(async move {
                for i in 0..5 {
                    history.write().await.record(&key(), snapshot(task * 10 + i, true));
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let store = history.read().await;
        assert_eq!(store.len(&key()), HISTORY_CAPACITY);
    }
}
