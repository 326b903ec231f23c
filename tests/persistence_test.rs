#![cfg(feature = "storage-rocksdb")]

use ledger_gateway::application::engine::AccountTransactionEngine;
use ledger_gateway::domain::account::CustomerId;
use ledger_gateway::domain::transaction::TransactionKind;
use ledger_gateway::error::LedgerError;
use ledger_gateway::infrastructure::rocksdb::RocksDBLedgerStore;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn engine(path: &std::path::Path) -> AccountTransactionEngine {
    let store = RocksDBLedgerStore::open(path).unwrap();
    AccountTransactionEngine::new(Arc::new(store), Duration::from_secs(1))
}

#[tokio::test]
async fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("ledger_db");

    let first_ids = {
        let engine = engine(&db_path);
        engine.create_account(CustomerId(7)).await.unwrap();
        let deposit = engine.deposit(CustomerId(7), dec!(100)).await.unwrap();
        let withdraw = engine.withdraw(CustomerId(7), dec!(40)).await.unwrap();
        (deposit.id, withdraw.id)
    };

    let engine = engine(&db_path);
    assert_eq!(engine.balance(CustomerId(7)).await.unwrap().value(), dec!(60));
    assert_eq!(
        engine.create_account(CustomerId(7)).await.unwrap_err(),
        LedgerError::AlreadyExists(CustomerId(7))
    );

    let next = engine.deposit(CustomerId(7), dec!(5)).await.unwrap();
    assert!(next.id > first_ids.1);

    let history = engine.transaction_history(CustomerId(7)).await.unwrap();
    let kinds: Vec<_> = history.iter().map(|tx| tx.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TransactionKind::Deposit,
            TransactionKind::Withdraw,
            TransactionKind::Deposit
        ]
    );
    assert_eq!(history[0].id, first_ids.0);
    assert_eq!(engine.balance(CustomerId(7)).await.unwrap().value(), dec!(65));
}

#[tokio::test]
async fn test_insufficient_funds_persists_nothing() {
    let dir = tempdir().unwrap();
    let engine = engine(dir.path());
    engine.create_account(CustomerId(1)).await.unwrap();
    engine.deposit(CustomerId(1), dec!(10)).await.unwrap();

    assert!(matches!(
        engine.withdraw(CustomerId(1), dec!(11)).await,
        Err(LedgerError::InsufficientFunds { .. })
    ));
    drop(engine);

    let engine = self::engine(dir.path());
    assert_eq!(engine.balance(CustomerId(1)).await.unwrap().value(), dec!(10));
    assert_eq!(engine.transaction_history(CustomerId(1)).await.unwrap().len(), 1);
}
