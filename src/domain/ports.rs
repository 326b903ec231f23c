use super::account::{Account, Balance, CustomerId};
use super::transaction::{NewTransaction, Transaction};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// The balance change and ledger entry produced by one mutation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountMutation {
    pub balance: Balance,
    pub entry: NewTransaction,
}

/// Durable storage for accounts and their transaction history.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Inserts a zero-balance account. Fails with `AlreadyExists` if the
    /// customer already owns one.
    async fn insert_account(&self, customer: CustomerId) -> Result<Account>;

    /// Reads a single account row without taking its lock.
    async fn account(&self, customer: CustomerId) -> Result<Option<Account>>;

    /// Acquires the exclusive lock on the customer's account row and reads
    /// it under that lock. Waits for the current holder; callers bound the
    /// wait themselves.
    async fn lock_account(&self, customer: CustomerId) -> Result<Option<Box<dyn LockedAccount>>>;

    /// All transactions of a customer, in insertion order.
    async fn transactions(&self, customer: CustomerId) -> Result<Vec<Transaction>>;

    /// Highest customer id that owns an account, if any.
    async fn last_customer(&self) -> Result<Option<CustomerId>>;
}

/// An account row held under its exclusive lock.
///
/// The lock is released when the value is dropped. Dropping it without a
/// successful `commit` persists nothing.
#[async_trait]
pub trait LockedAccount: Send {
    fn account(&self) -> &Account;

    /// Writes the new balance and appends the transaction as one atomic unit.
    async fn commit(&mut self, mutation: AccountMutation) -> Result<Transaction>;
}

pub type LedgerStoreRef = Arc<dyn LedgerStore>;
