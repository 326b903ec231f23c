use crate::domain::account::CustomerId;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Stable, machine-readable classification of every failure the system reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing input. Never retried automatically.
    Validation,
    /// Missing, invalid or expired credential, or failed ownership check.
    Auth,
    /// Business rule outcome such as insufficient funds.
    Domain,
    /// Lock timeout or store unavailability. Safe to retry.
    TransientInfra,
    /// Idempotency key already seen.
    DuplicateRequest,
    /// Rate limit exceeded.
    Overload,
    /// Downstream target isolated by its circuit breaker.
    CircuitOpen,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Auth => "auth",
            ErrorKind::Domain => "domain",
            ErrorKind::TransientInfra => "transient_infra",
            ErrorKind::DuplicateRequest => "duplicate_request",
            ErrorKind::Overload => "overload",
            ErrorKind::CircuitOpen => "circuit_open",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the ledger engine and its stores.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("amount must be positive, got {0}")]
    InvalidAmount(Decimal),
    #[error("account already exists for customer {0}")]
    AlreadyExists(CustomerId),
    #[error("account not found for customer {0}")]
    AccountNotFound(CustomerId),
    #[error("insufficient funds: customer {customer} has {available}, requested {requested}")]
    InsufficientFunds {
        customer: CustomerId,
        available: Decimal,
        requested: Decimal,
    },
    #[error("deposit of {amount} would overflow the balance of customer {customer}")]
    BalanceOverflow { customer: CustomerId, amount: Decimal },
    #[error("ledger store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("commit failed: {0}")]
    CommitFailed(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidAmount(_) => ErrorKind::Validation,
            LedgerError::AlreadyExists(_)
            | LedgerError::AccountNotFound(_)
            | LedgerError::InsufficientFunds { .. }
            | LedgerError::BalanceOverflow { .. } => ErrorKind::Domain,
            LedgerError::StoreUnavailable(_) | LedgerError::CommitFailed(_) => {
                ErrorKind::TransientInfra
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount(_) => "invalid_amount",
            LedgerError::AlreadyExists(_) => "already_exists",
            LedgerError::AccountNotFound(_) => "account_not_found",
            LedgerError::InsufficientFunds { .. } => "insufficient_funds",
            LedgerError::BalanceOverflow { .. } => "balance_overflow",
            LedgerError::StoreUnavailable(_) => "store_unavailable",
            LedgerError::CommitFailed(_) => "commit_failed",
        }
    }

    /// Only infrastructure faults are worth retrying; domain outcomes are final.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::TransientInfra
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LedgerError {
    fn from(err: rocksdb::Error) -> Self {
        LedgerError::StoreUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
