use crate::error::LedgerError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a customer, assigned by the identity collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub u32);

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for CustomerId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Strictly positive value carried by a deposit or withdraw.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, LedgerError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(LedgerError::InvalidAmount(value))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = LedgerError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A non-negative account balance.
///
/// There is no way to build a negative `Balance`: subtraction is checked and
/// yields `None` instead of going below zero. Addition is checked too.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Balance(Decimal);

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Returns `None` for negative values.
    pub fn new(value: Decimal) -> Option<Self> {
        (value >= Decimal::ZERO).then_some(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn checked_sub(self, amount: Amount) -> Option<Self> {
        Self::new(self.0.checked_sub(amount.0)?)
    }

    /// `None` when the sum exceeds what a `Decimal` can hold.
    pub fn checked_add(self, amount: Amount) -> Option<Self> {
        self.0.checked_add(amount.0).map(Self)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The ledger row of a customer's account.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Account {
    /// System-assigned account identifier.
    pub id: u64,
    /// Owning customer; at most one account per customer.
    pub customer: CustomerId,
    pub balance: Balance,
}

impl Account {
    pub fn new(id: u64, customer: CustomerId) -> Self {
        Self {
            id,
            customer,
            balance: Balance::ZERO,
        }
    }

    /// Balance after crediting `amount`, or `BalanceOverflow`.
    pub fn credited(&self, amount: Amount) -> Result<Balance, LedgerError> {
        self.balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow {
                customer: self.customer,
                amount: amount.value(),
            })
    }

    /// Balance after debiting `amount`, or `InsufficientFunds`.
    pub fn debited(&self, amount: Amount) -> Result<Balance, LedgerError> {
        self.balance
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientFunds {
                customer: self.customer,
                available: self.balance.value(),
                requested: amount.value(),
            })
    }
}
