use crate::domain::account::{Account, CustomerId};
use crate::domain::ports::{AccountMutation, LedgerStore, LockedAccount};
use crate::domain::transaction::{Transaction, TransactionId};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Default)]
struct LedgerRows {
    accounts: HashMap<CustomerId, Account>,
    history: HashMap<CustomerId, Vec<Transaction>>,
    next_account_id: u64,
    next_transaction_id: u64,
}

/// A thread-safe in-memory ledger store.
///
/// Rows live behind one `RwLock` so a commit updates the balance and appends
/// the transaction under a single write guard. Each account additionally has
/// its own row lock, held by `LockedAccount` for the whole
/// read-modify-append-commit sequence.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    rows: Arc<RwLock<LedgerRows>>,
    row_locks: Arc<DashMap<CustomerId, Arc<Mutex<()>>>>,
}

impl InMemoryLedgerStore {
    /// Creates a new, empty in-memory ledger store.
    pub fn new() -> Self {
        Self::default()
    }

    fn row_lock(&self, customer: CustomerId) -> Arc<Mutex<()>> {
        Arc::clone(&self.row_locks.entry(customer).or_default())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_account(&self, customer: CustomerId) -> Result<Account> {
        let mut rows = self.rows.write().await;
        if rows.accounts.contains_key(&customer) {
            return Err(LedgerError::AlreadyExists(customer));
        }
        rows.next_account_id += 1;
        let account = Account::new(rows.next_account_id, customer);
        rows.accounts.insert(customer, account.clone());
        Ok(account)
    }

    async fn account(&self, customer: CustomerId) -> Result<Option<Account>> {
        let rows = self.rows.read().await;
        Ok(rows.accounts.get(&customer).cloned())
    }

    async fn lock_account(&self, customer: CustomerId) -> Result<Option<Box<dyn LockedAccount>>> {
        // Accounts are never deleted, so an existence check before locking is stable.
        if !self.rows.read().await.accounts.contains_key(&customer) {
            return Ok(None);
        }

        let guard = self.row_lock(customer).lock_owned().await;
        let account = self
            .rows
            .read()
            .await
            .accounts
            .get(&customer)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(customer))?;

        Ok(Some(Box::new(InMemoryLockedAccount {
            rows: Arc::clone(&self.rows),
            account,
            committed: false,
            _guard: guard,
        })))
    }

    async fn transactions(&self, customer: CustomerId) -> Result<Vec<Transaction>> {
        let rows = self.rows.read().await;
        Ok(rows.history.get(&customer).cloned().unwrap_or_default())
    }

    async fn last_customer(&self) -> Result<Option<CustomerId>> {
        Ok(self.rows.read().await.accounts.keys().max().copied())
    }
}

struct InMemoryLockedAccount {
    rows: Arc<RwLock<LedgerRows>>,
    account: Account,
    committed: bool,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl LockedAccount for InMemoryLockedAccount {
    fn account(&self) -> &Account {
        &self.account
    }

    async fn commit(&mut self, mutation: AccountMutation) -> Result<Transaction> {
        let customer = self.account.customer;
        if self.committed {
            return Err(LedgerError::CommitFailed(format!(
                "account {customer} already committed under this lock"
            )));
        }
        if mutation.entry.customer != customer {
            return Err(LedgerError::CommitFailed(format!(
                "transaction for customer {} staged on account {customer}",
                mutation.entry.customer
            )));
        }

        // Balance and history change under one write guard.
        let mut guard = self.rows.write().await;
        let rows = &mut *guard;
        let account = rows
            .accounts
            .get_mut(&customer)
            .ok_or(LedgerError::AccountNotFound(customer))?;

        rows.next_transaction_id += 1;
        let tx = mutation
            .entry
            .into_transaction(TransactionId(rows.next_transaction_id), Utc::now());

        account.balance = mutation.balance;
        rows.history.entry(customer).or_default().push(tx.clone());

        self.account.balance = mutation.balance;
        self.committed = true;
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{Amount, Balance};
    use crate::domain::transaction::{NewTransaction, TransactionKind};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn deposit_of(customer: CustomerId, value: rust_decimal::Decimal) -> AccountMutation {
        AccountMutation {
            balance: Balance::new(value).unwrap(),
            entry: NewTransaction {
                customer,
                kind: TransactionKind::Deposit,
                amount: Amount::new(value).unwrap(),
            },
        }
    }

    #[tokio::test]
    async fn test_insert_account_rejects_duplicates() {
        let store = InMemoryLedgerStore::new();
        let account = store.insert_account(CustomerId(1)).await.unwrap();
        assert_eq!(account.balance, Balance::ZERO);

        let err = store.insert_account(CustomerId(1)).await.unwrap_err();
        assert_eq!(err, LedgerError::AlreadyExists(CustomerId(1)));
    }

    #[tokio::test]
    async fn test_last_customer_is_highest_id() {
        let store = InMemoryLedgerStore::new();
        assert_eq!(store.last_customer().await.unwrap(), None);
        for id in [4, 17, 9] {
            store.insert_account(CustomerId(id)).await.unwrap();
        }
        assert_eq!(store.last_customer().await.unwrap(), Some(CustomerId(17)));
    }

    #[tokio::test]
    async fn test_lock_unknown_account() {
        let store = InMemoryLedgerStore::new();
        assert!(store.lock_account(CustomerId(9)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_updates_balance_and_history() {
        let store = InMemoryLedgerStore::new();
        store.insert_account(CustomerId(1)).await.unwrap();

        let mut locked = store.lock_account(CustomerId(1)).await.unwrap().unwrap();
        let tx = locked
            .commit(deposit_of(CustomerId(1), dec!(100)))
            .await
            .unwrap();
        drop(locked);

        let account = store.account(CustomerId(1)).await.unwrap().unwrap();
        assert_eq!(account.balance.value(), dec!(100));
        assert_eq!(store.transactions(CustomerId(1)).await.unwrap(), vec![tx]);
    }

    #[tokio::test]
    async fn test_drop_without_commit_persists_nothing() {
        let store = InMemoryLedgerStore::new();
        store.insert_account(CustomerId(1)).await.unwrap();

        let locked = store.lock_account(CustomerId(1)).await.unwrap().unwrap();
        drop(locked);

        let account = store.account(CustomerId(1)).await.unwrap().unwrap();
        assert_eq!(account.balance, Balance::ZERO);
        assert!(store.transactions(CustomerId(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_row_lock_is_exclusive_per_account() {
        let store = InMemoryLedgerStore::new();
        store.insert_account(CustomerId(1)).await.unwrap();
        store.insert_account(CustomerId(2)).await.unwrap();

        let held = store.lock_account(CustomerId(1)).await.unwrap().unwrap();

        let same = tokio::time::timeout(
            Duration::from_millis(50),
            store.lock_account(CustomerId(1)),
        )
        .await;
        assert!(same.is_err(), "second lock on the same account must wait");

        let other = tokio::time::timeout(
            Duration::from_millis(50),
            store.lock_account(CustomerId(2)),
        )
        .await;
        assert!(other.is_ok(), "different accounts never contend");

        drop(held);
        assert!(store.lock_account(CustomerId(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_transaction_ids_increase_across_customers() {
        let store = InMemoryLedgerStore::new();
        store.insert_account(CustomerId(1)).await.unwrap();
        store.insert_account(CustomerId(2)).await.unwrap();

        let mut first = store.lock_account(CustomerId(1)).await.unwrap().unwrap();
        let a = first.commit(deposit_of(CustomerId(1), dec!(1))).await.unwrap();
        let mut second = store.lock_account(CustomerId(2)).await.unwrap().unwrap();
        let b = second.commit(deposit_of(CustomerId(2), dec!(1))).await.unwrap();

        assert!(b.id > a.id);
    }
}
