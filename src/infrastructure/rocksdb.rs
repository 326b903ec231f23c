use crate::domain::account::{Account, CustomerId};
use crate::domain::ports::{AccountMutation, LedgerStore, LockedAccount};
use crate::domain::transaction::{Transaction, TransactionId};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex as SeqMutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Column Family for storing account rows.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for storing transaction history.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for id sequences.
pub const CF_META: &str = "meta";

const ACCOUNT_SEQ_KEY: &[u8] = b"account_seq";
const TRANSACTION_SEQ_KEY: &[u8] = b"transaction_seq";

#[derive(Debug, Default, Clone, Copy)]
struct Sequences {
    account: u64,
    transaction: u64,
}

struct Shared {
    db: DB,
    sequences: SeqMutex<Sequences>,
    row_locks: DashMap<CustomerId, Arc<Mutex<()>>>,
}

/// A persistent ledger store implementation using RocksDB.
///
/// Accounts and transactions live in separate Column Families. A balance
/// update, its transaction row and the advanced id sequence are written in
/// one `WriteBatch`, so a crash never leaves one without the other.
///
/// Transaction keys are `customer (big endian) || id (big endian)`, which
/// makes a prefix scan return a customer's history in insertion order.
///
/// This struct is thread-safe (`Clone` shares the underlying database).
#[derive(Clone)]
pub struct RocksDBLedgerStore {
    shared: Arc<Shared>,
}

impl RocksDBLedgerStore {
    /// Opens or creates a RocksDB instance at the specified path and
    /// recovers the id sequences.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_ACCOUNTS, CF_TRANSACTIONS, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        let shared = Shared {
            db,
            sequences: SeqMutex::new(Sequences::default()),
            row_locks: DashMap::new(),
        };
        let sequences = Sequences {
            account: read_seq(&shared.db, ACCOUNT_SEQ_KEY)?,
            transaction: read_seq(&shared.db, TRANSACTION_SEQ_KEY)?,
        };
        *shared.sequences.lock() = sequences;

        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    fn row_lock(&self, customer: CustomerId) -> Arc<Mutex<()>> {
        Arc::clone(&self.shared.row_locks.entry(customer).or_default())
    }
}

fn cf<'a>(db: &'a DB, name: &str) -> Result<&'a ColumnFamily> {
    db.cf_handle(name)
        .ok_or_else(|| LedgerError::StoreUnavailable(format!("{name} column family not found")))
}

fn read_seq(db: &DB, key: &[u8]) -> Result<u64> {
    let value = db.get_cf(cf(db, CF_META)?, key)?;
    match value {
        Some(bytes) => {
            let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                LedgerError::StoreUnavailable(format!(
                    "corrupt sequence {}",
                    String::from_utf8_lossy(key)
                ))
            })?;
            Ok(u64::from_be_bytes(raw))
        }
        None => Ok(0),
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| LedgerError::StoreUnavailable(format!("Serialization error: {e}")))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| LedgerError::StoreUnavailable(format!("Deserialization error: {e}")))
}

fn transaction_key(customer: CustomerId, id: TransactionId) -> [u8; 12] {
    let mut key = [0u8; 12];
    key[..4].copy_from_slice(&customer.0.to_be_bytes());
    key[4..].copy_from_slice(&id.0.to_be_bytes());
    key
}

fn read_account(db: &DB, customer: CustomerId) -> Result<Option<Account>> {
    match db.get_cf(cf(db, CF_ACCOUNTS)?, customer.0.to_be_bytes())? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

#[async_trait]
impl LedgerStore for RocksDBLedgerStore {
    async fn insert_account(&self, customer: CustomerId) -> Result<Account> {
        let _row = self.row_lock(customer).lock_owned().await;
        let db = &self.shared.db;
        if read_account(db, customer)?.is_some() {
            return Err(LedgerError::AlreadyExists(customer));
        }

        let mut sequences = self.shared.sequences.lock();
        let id = sequences.account + 1;
        let account = Account::new(id, customer);

        let mut batch = WriteBatch::default();
        batch.put_cf(cf(db, CF_ACCOUNTS)?, customer.0.to_be_bytes(), encode(&account)?);
        batch.put_cf(cf(db, CF_META)?, ACCOUNT_SEQ_KEY, id.to_be_bytes());
        db.write(batch)?;

        sequences.account = id;
        Ok(account)
    }

    async fn account(&self, customer: CustomerId) -> Result<Option<Account>> {
        read_account(&self.shared.db, customer)
    }

    async fn lock_account(&self, customer: CustomerId) -> Result<Option<Box<dyn LockedAccount>>> {
        if read_account(&self.shared.db, customer)?.is_none() {
            return Ok(None);
        }
        let guard = self.row_lock(customer).lock_owned().await;
        let account = read_account(&self.shared.db, customer)?
            .ok_or(LedgerError::AccountNotFound(customer))?;

        Ok(Some(Box::new(RocksDBLockedAccount {
            shared: Arc::clone(&self.shared),
            account,
            committed: false,
            _guard: guard,
        })))
    }

    async fn transactions(&self, customer: CustomerId) -> Result<Vec<Transaction>> {
        let db = &self.shared.db;
        let prefix = customer.0.to_be_bytes();
        let iter = db.iterator_cf(
            cf(db, CF_TRANSACTIONS)?,
            IteratorMode::From(&prefix, Direction::Forward),
        );

        let mut transactions = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            transactions.push(decode(&value)?);
        }
        Ok(transactions)
    }

    async fn last_customer(&self) -> Result<Option<CustomerId>> {
        let db = &self.shared.db;
        // Account keys are big-endian, so the last key is the highest id.
        match db.iterator_cf(cf(db, CF_ACCOUNTS)?, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item?;
                let raw: [u8; 4] = key.as_ref().try_into().map_err(|_| {
                    LedgerError::StoreUnavailable("corrupt account key".into())
                })?;
                Ok(Some(CustomerId(u32::from_be_bytes(raw))))
            }
            None => Ok(None),
        }
    }
}

struct RocksDBLockedAccount {
    shared: Arc<Shared>,
    account: Account,
    committed: bool,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl LockedAccount for RocksDBLockedAccount {
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

        let db = &self.shared.db;
        let mut sequences = self.shared.sequences.lock();
        let id = TransactionId(sequences.transaction + 1);
        let tx = mutation.entry.into_transaction(id, Utc::now());

        let mut updated = self.account.clone();
        updated.balance = mutation.balance;

        let mut batch = WriteBatch::default();
        batch.put_cf(cf(db, CF_ACCOUNTS)?, customer.0.to_be_bytes(), encode(&updated)?);
        batch.put_cf(cf(db, CF_TRANSACTIONS)?, transaction_key(customer, id), encode(&tx)?);
        batch.put_cf(cf(db, CF_META)?, TRANSACTION_SEQ_KEY, id.0.to_be_bytes());
        db.write(batch)
            .map_err(|e| LedgerError::CommitFailed(e.to_string()))?;

        sequences.transaction = id.0;
        self.account = updated;
        self.committed = true;
        Ok(tx)
    }
}
