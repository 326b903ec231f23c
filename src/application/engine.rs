use crate::domain::account::{Account, Amount, Balance, CustomerId};
use crate::domain::ports::{AccountMutation, LedgerStoreRef, LockedAccount};
use crate::domain::transaction::{NewTransaction, Transaction, TransactionKind};
use crate::error::{LedgerError, Result};
use crate::gateway::ports::AccountService;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{debug, info};

/// Owns account balance mutation and transaction-history append.
///
/// Every mutation runs under the store's exclusive lock for the target
/// account: read, modify, append and commit happen while the lock is held,
/// and the lock is released on every exit path when the `LockedAccount`
/// drops. Operations on different accounts never contend.
pub struct AccountTransactionEngine {
    store: LedgerStoreRef,
    lock_timeout: Duration,
}

impl AccountTransactionEngine {
    /// Creates a new engine.
    ///
    /// # Arguments
    ///
    /// * `store` - The ledger store holding accounts and transactions.
    /// * `lock_timeout` - Upper bound on waiting for an account lock.
    pub fn new(store: LedgerStoreRef, lock_timeout: Duration) -> Self {
        Self {
            store,
            lock_timeout,
        }
    }

    pub async fn create_account(&self, customer: CustomerId) -> Result<Account> {
        let account = self.store.insert_account(customer).await?;
        info!(customer = %customer, account = account.id, "account created");
        Ok(account)
    }

    /// Credits `amount` and appends a deposit row atomically.
    pub async fn deposit(&self, customer: CustomerId, amount: Decimal) -> Result<Transaction> {
        let amount = Amount::new(amount)?;
        let mut locked = self.lock(customer).await?;
        let balance = locked.account().credited(amount)?;
        let tx = Self::commit(locked.as_mut(), balance, TransactionKind::Deposit, amount).await?;
        info!(customer = %customer, amount = %amount, tx = %tx.id, "deposit committed");
        Ok(tx)
    }

    /// Debits `amount` and appends a withdraw row atomically. Fails with
    /// `InsufficientFunds` without touching the account when the balance
    /// does not cover the amount.
    pub async fn withdraw(&self, customer: CustomerId, amount: Decimal) -> Result<Transaction> {
        let amount = Amount::new(amount)?;
        let mut locked = self.lock(customer).await?;
        let balance = match locked.account().debited(amount) {
            Ok(balance) => balance,
            Err(err) => {
                debug!(customer = %customer, amount = %amount, "withdraw rejected: {err}");
                return Err(err);
            }
        };
        let tx = Self::commit(locked.as_mut(), balance, TransactionKind::Withdraw, amount).await?;
        info!(customer = %customer, amount = %amount, tx = %tx.id, "withdraw committed");
        Ok(tx)
    }

    /// Lock-free read of the current balance.
    pub async fn balance(&self, customer: CustomerId) -> Result<Balance> {
        self.store
            .account(customer)
            .await?
            .map(|account| account.balance)
            .ok_or(LedgerError::AccountNotFound(customer))
    }

    /// All transactions of the customer in insertion order.
    pub async fn transaction_history(&self, customer: CustomerId) -> Result<Vec<Transaction>> {
        if self.store.account(customer).await?.is_none() {
            return Err(LedgerError::AccountNotFound(customer));
        }
        self.store.transactions(customer).await
    }

    async fn lock(&self, customer: CustomerId) -> Result<Box<dyn LockedAccount>> {
        match tokio::time::timeout(self.lock_timeout, self.store.lock_account(customer)).await {
            Ok(locked) => locked?.ok_or(LedgerError::AccountNotFound(customer)),
            Err(_) => Err(LedgerError::StoreUnavailable(format!(
                "timed out after {:?} waiting for account {customer}",
                self.lock_timeout
            ))),
        }
    }

    async fn commit(
        locked: &mut dyn LockedAccount,
        balance: Balance,
        kind: TransactionKind,
        amount: Amount,
    ) -> Result<Transaction> {
        let customer = locked.account().customer;
        locked
            .commit(AccountMutation {
                balance,
                entry: NewTransaction {
                    customer,
                    kind,
                    amount,
                },
            })
            .await
    }
}

#[async_trait]
impl AccountService for AccountTransactionEngine {
    async fn create_account(&self, customer: CustomerId) -> Result<Account> {
        AccountTransactionEngine::create_account(self, customer).await
    }

    async fn deposit(&self, customer: CustomerId, amount: Decimal) -> Result<Transaction> {
        AccountTransactionEngine::deposit(self, customer, amount).await
    }

    async fn withdraw(&self, customer: CustomerId, amount: Decimal) -> Result<Transaction> {
        AccountTransactionEngine::withdraw(self, customer, amount).await
    }

    async fn balance(&self, customer: CustomerId) -> Result<Balance> {
        AccountTransactionEngine::balance(self, customer).await
    }

    async fn transaction_history(&self, customer: CustomerId) -> Result<Vec<Transaction>> {
        AccountTransactionEngine::transaction_history(self, customer).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemoryLedgerStore;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn engine() -> AccountTransactionEngine {
        AccountTransactionEngine::new(
            Arc::new(InMemoryLedgerStore::new()),
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn test_create_account_twice() {
        let engine = engine();
        engine.create_account(CustomerId(1)).await.unwrap();
        assert_eq!(
            engine.create_account(CustomerId(1)).await.unwrap_err(),
            LedgerError::AlreadyExists(CustomerId(1))
        );
    }

    #[tokio::test]
    async fn test_deposit_overflow_is_rejected_without_mutation() {
        let engine = engine();
        engine.create_account(CustomerId(1)).await.unwrap();
        engine.deposit(CustomerId(1), Decimal::MAX).await.unwrap();

        let err = engine.deposit(CustomerId(1), dec!(1)).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::BalanceOverflow {
                customer: CustomerId(1),
                amount: dec!(1),
            }
        );
        assert_eq!(err.kind(), crate::error::ErrorKind::Domain);
        assert_eq!(engine.balance(CustomerId(1)).await.unwrap().value(), Decimal::MAX);
        assert_eq!(engine.transaction_history(CustomerId(1)).await.unwrap().len(), 1);

        // The lock was released on the error path.
        engine.withdraw(CustomerId(1), dec!(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_deposit_rejects_non_positive_amounts() {
        let engine = engine();
        engine.create_account(CustomerId(1)).await.unwrap();

        for amount in [dec!(0), dec!(-5)] {
            assert_eq!(
                engine.deposit(CustomerId(1), amount).await.unwrap_err(),
                LedgerError::InvalidAmount(amount)
            );
        }
        assert!(engine.transaction_history(CustomerId(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_operations_on_missing_account() {
        let engine = engine();
        let missing = CustomerId(42);
        assert_eq!(
            engine.deposit(missing, dec!(1)).await.unwrap_err(),
            LedgerError::AccountNotFound(missing)
        );
        assert_eq!(
            engine.withdraw(missing, dec!(1)).await.unwrap_err(),
            LedgerError::AccountNotFound(missing)
        );
        assert_eq!(
            engine.balance(missing).await.unwrap_err(),
            LedgerError::AccountNotFound(missing)
        );
        assert_eq!(
            engine.transaction_history(missing).await.unwrap_err(),
            LedgerError::AccountNotFound(missing)
        );
    }

    #[tokio::test]
    async fn test_withdraw_insufficient_funds_leaves_account_untouched() {
        let engine = engine();
        engine.create_account(CustomerId(1)).await.unwrap();
        engine.deposit(CustomerId(1), dec!(10)).await.unwrap();

        let err = engine.withdraw(CustomerId(1), dec!(10.01)).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(engine.balance(CustomerId(1)).await.unwrap().value(), dec!(10));
        assert_eq!(engine.transaction_history(CustomerId(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_withdraw_entire_balance() {
        let engine = engine();
        engine.create_account(CustomerId(1)).await.unwrap();
        engine.deposit(CustomerId(1), dec!(25.50)).await.unwrap();

        let tx = engine.withdraw(CustomerId(1), dec!(25.50)).await.unwrap();
        assert_eq!(tx.kind, TransactionKind::Withdraw);
        assert_eq!(engine.balance(CustomerId(1)).await.unwrap(), Balance::ZERO);
    }
}
