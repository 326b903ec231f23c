use crate::domain::account::{Balance, CustomerId};
use crate::domain::transaction::Transaction;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub customer_id: CustomerId,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct CustomerQuery {
    pub customer_id: CustomerId,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
    #[serde(rename = "customer-id")]
    pub customer_id: CustomerId,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MutationResponse {
    pub success: bool,
    pub message: &'static str,
}

/// Monetary values leave the API as JSON numbers, i.e. IEEE-754 doubles.
/// That is exact for amounts up to 15 significant digits; beyond that a
/// client sees the nearest double while the ledger keeps the exact
/// `Decimal`.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    pub message: &'static str,
}

impl BalanceResponse {
    pub fn new(balance: Balance) -> Self {
        Self {
            balance: balance.value(),
            message: "balance inquiry successful",
        }
    }
}

/// History row as the API presents it; `date` is RFC 3339 and `amount`
/// follows the same number encoding as `BalanceResponse`.
#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub id: u64,
    pub customer_id: CustomerId,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub date: String,
}

impl From<Transaction> for TransactionView {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id.0,
            customer_id: tx.customer,
            kind: tx.kind.as_str(),
            amount: tx.amount.value(),
            date: tx.timestamp.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<TransactionView>,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
    pub code: &'static str,
}
