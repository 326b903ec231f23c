use super::account::{Amount, CustomerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned, monotonically increasing transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdraw => "withdraw",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable, append-only ledger entry.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    pub id: TransactionId,
    pub customer: CustomerId,
    pub kind: TransactionKind,
    pub amount: Amount,
    pub timestamp: DateTime<Utc>,
}

/// A transaction row that has not been committed yet; the store assigns
/// its id and timestamp at commit time.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct NewTransaction {
    pub customer: CustomerId,
    pub kind: TransactionKind,
    pub amount: Amount,
}

impl NewTransaction {
    pub fn into_transaction(self, id: TransactionId, timestamp: DateTime<Utc>) -> Transaction {
        Transaction {
            id,
            customer: self.customer,
            kind: self.kind,
            amount: self.amount,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TransactionKind::Withdraw).unwrap(),
            "\"withdraw\""
        );
    }

    #[test]
    fn test_new_transaction_keeps_fields() {
        let pending = NewTransaction {
            customer: CustomerId(3),
            kind: TransactionKind::Deposit,
            amount: Amount::new(dec!(5)).unwrap(),
        };
        let now = Utc::now();
        let tx = pending.into_transaction(TransactionId(9), now);
        assert_eq!(tx.id, TransactionId(9));
        assert_eq!(tx.customer, CustomerId(3));
        assert_eq!(tx.kind, TransactionKind::Deposit);
        assert_eq!(tx.timestamp, now);
    }
}
