//! Outbound ports the gateway depends on.
//!
//! Each downstream target is reached through one of these traits, so the
//! gateway can wrap every call in that target's circuit breaker without
//! knowing whether the target is in-process or remote.

use crate::domain::account::{Account, Balance, CustomerId};
use crate::domain::transaction::Transaction;
use crate::error::LedgerError;
use crate::gateway::error::IdentityError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

/// Typed calls into the account ledger.
#[async_trait]
pub trait AccountService: Send + Sync {
    async fn create_account(&self, customer: CustomerId) -> Result<Account, LedgerError>;
    async fn deposit(&self, customer: CustomerId, amount: Decimal) -> Result<Transaction, LedgerError>;
    async fn withdraw(&self, customer: CustomerId, amount: Decimal) -> Result<Transaction, LedgerError>;
    async fn balance(&self, customer: CustomerId) -> Result<Balance, LedgerError>;
    async fn transaction_history(&self, customer: CustomerId) -> Result<Vec<Transaction>, LedgerError>;
}

/// Confirms that an authenticated principal owns a customer identifier.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify_ownership(&self, username: &str, customer: CustomerId) -> Result<bool, IdentityError>;
}

/// Registration and credential checks, owned by the identity service.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn register(&self, username: &str, password: &str) -> Result<CustomerId, IdentityError>;
    /// Removes a registration that never got its ledger account. A no-op
    /// unless `username` is still bound to `customer`.
    async fn unregister(&self, username: &str, customer: CustomerId) -> Result<(), IdentityError>;
    async fn authenticate(&self, username: &str, password: &str) -> Result<CustomerId, IdentityError>;
}

/// Key store with atomic check-and-set and per-entry expiry.
#[async_trait]
pub trait TtlKeyStore: Send + Sync {
    /// Stores `key` unless a visible entry exists. Returns `true` when this
    /// call inserted it. Expired entries count as absent.
    async fn insert_if_absent(&self, key: &str, ttl: Duration) -> bool;
    async fn contains(&self, key: &str) -> bool;
    async fn remove(&self, key: &str);
    /// Physically removes entries older than both their ttl and `retention`.
    async fn purge_expired(&self, retention: Duration) -> usize;
}

pub type AccountServiceRef = Arc<dyn AccountService>;
pub type IdentityVerifierRef = Arc<dyn IdentityVerifier>;
pub type CustomerDirectoryRef = Arc<dyn CustomerDirectory>;
pub type TtlKeyStoreRef = Arc<dyn TtlKeyStore>;
