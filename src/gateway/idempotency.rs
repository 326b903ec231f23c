use crate::gateway::ports::TtlKeyStoreRef;
use std::time::Duration;
use tracing::info;

/// Result of presenting an idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// First sighting; the caller owns the key and should proceed.
    Fresh,
    /// Seen within the ttl; the request must not be processed again.
    Duplicate,
}

/// Rejects repeated client requests presenting the same key within a ttl.
#[derive(Clone)]
pub struct IdempotencyGuard {
    store: TtlKeyStoreRef,
    ttl: Duration,
}

impl IdempotencyGuard {
    pub fn new(store: TtlKeyStoreRef, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Keys are namespaced per principal so clients cannot collide.
    pub fn scoped(principal: &str, key: &str) -> String {
        format!("{principal}:{key}")
    }

    pub async fn check_and_reserve(&self, key: &str) -> Reservation {
        if self.store.insert_if_absent(key, self.ttl).await {
            Reservation::Fresh
        } else {
            info!(key, "duplicate idempotency key");
            Reservation::Duplicate
        }
    }

    /// Frees a key whose request committed nothing, so the client may retry.
    pub async fn release(&self, key: &str) {
        self.store.remove(key).await;
    }

    pub async fn purge(&self, retention: Duration) -> usize {
        self.store.purge_expired(retention).await
    }
}
