use crate::gateway::ports::TtlKeyStore;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct TtlEntry {
    inserted_at: Instant,
    ttl: Duration,
}

impl TtlEntry {
    fn is_visible(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) < self.ttl
    }
}

/// In-memory key store with per-entry expiry.
///
/// `insert_if_absent` runs under the DashMap shard lock of the key, so two
/// concurrent callers presenting the same key can never both win. Expired
/// entries are invisible immediately and physically removed by
/// `purge_expired`.
#[derive(Default, Clone)]
pub struct InMemoryTtlStore {
    entries: Arc<DashMap<String, TtlEntry>>,
}

impl InMemoryTtlStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of physically stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl TtlKeyStore for InMemoryTtlStore {
    async fn insert_if_absent(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let fresh = TtlEntry {
            inserted_at: now,
            ttl,
        };
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_visible(now) {
                    false
                } else {
                    occupied.insert(fresh);
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                true
            }
        }
    }

    async fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.is_visible(Instant::now()))
    }

    async fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    async fn purge_expired(&self, retention: Duration) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            now.duration_since(entry.inserted_at) < entry.ttl.max(retention)
        });
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!(purged, "purged expired keys");
        }
        purged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_if_absent_is_check_and_set() {
        let store = InMemoryTtlStore::new();
        assert!(store.insert_if_absent("k", Duration::from_secs(60)).await);
        assert!(!store.insert_if_absent("k", Duration::from_secs(60)).await);
        assert!(store.contains("k").await);
    }

    #[tokio::test]
    async fn test_expired_key_can_be_reused() {
        let store = InMemoryTtlStore::new();
        assert!(store.insert_if_absent("k", Duration::from_millis(20)).await);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!store.contains("k").await);
        assert!(store.insert_if_absent("k", Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_purge_respects_retention() {
        let store = InMemoryTtlStore::new();
        store.insert_if_absent("k", Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Invisible but still retained.
        assert_eq!(store.purge_expired(Duration::from_secs(60)).await, 0);
        assert_eq!(store.len(), 1);

        assert_eq!(store.purge_expired(Duration::from_millis(10)).await, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_reservations_have_one_winner() {
        let store = InMemoryTtlStore::new();
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.insert_if_absent("same", Duration::from_secs(60)).await
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
