//! Application layer containing the core ledger orchestration.
//!
//! This module defines the `AccountTransactionEngine`, the only component
//! allowed to change balances. It relies on the store's per-account locks for
//! serialization instead of a single global queue, so unrelated accounts are
//! processed concurrently.

pub mod engine;
