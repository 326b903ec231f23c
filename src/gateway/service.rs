use crate::domain::account::{Amount, Balance, CustomerId};
use crate::domain::transaction::{Transaction, TransactionKind};
use crate::gateway::auth::{AuthError, AuthGuard, Principal};
use crate::gateway::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitStats};
use crate::gateway::error::GatewayError;
use crate::gateway::idempotency::{IdempotencyGuard, Reservation};
use crate::gateway::ports::{AccountServiceRef, CustomerDirectoryRef, IdentityVerifierRef};
use crate::gateway::rate_limit::RateLimiter;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const IDENTITY_TARGET: &str = "identity";
pub const ACCOUNT_TARGET: &str = "account";

/// Everything a `Gateway` is assembled from.
pub struct GatewayParts {
    pub accounts: AccountServiceRef,
    pub directory: CustomerDirectoryRef,
    pub verifier: IdentityVerifierRef,
    pub auth: AuthGuard,
    pub rate_limiter: RateLimiter,
    pub idempotency: IdempotencyGuard,
    pub breaker: CircuitBreakerConfig,
}

struct GatewayInner {
    accounts: AccountServiceRef,
    directory: CustomerDirectoryRef,
    verifier: IdentityVerifierRef,
    auth: AuthGuard,
    rate_limiter: RateLimiter,
    idempotency: IdempotencyGuard,
    identity_breaker: CircuitBreaker,
    account_breaker: CircuitBreaker,
}

/// Front door for client requests.
///
/// Mutations run through authentication, rate limiting, idempotency,
/// ownership verification and finally the ledger, each downstream call
/// guarded by that target's circuit breaker.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

impl Gateway {
    pub fn new(parts: GatewayParts) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                identity_breaker: CircuitBreaker::new(IDENTITY_TARGET, parts.breaker.clone()),
                account_breaker: CircuitBreaker::new(ACCOUNT_TARGET, parts.breaker),
                accounts: parts.accounts,
                directory: parts.directory,
                verifier: parts.verifier,
                auth: parts.auth,
                rate_limiter: parts.rate_limiter,
                idempotency: parts.idempotency,
            }),
        }
    }

    /// Creates the customer and their empty account. When the account
    /// cannot be created the registration is rolled back, so the username
    /// is never left bound to an id without an account of its own.
    pub async fn register(&self, username: &str, password: &str) -> Result<CustomerId, GatewayError> {
        let inner = &self.inner;
        let customer = inner
            .identity_breaker
            .call(|| inner.directory.register(username, password))
            .await?;
        let created = inner
            .account_breaker
            .call(|| inner.accounts.create_account(customer))
            .await;
        if let Err(err) = created {
            warn!(
                username,
                customer = %customer,
                error = %err,
                "account creation failed, rolling back registration"
            );
            if let Err(rollback) = inner.directory.unregister(username, customer).await {
                warn!(username, error = %rollback, "registration rollback failed");
            }
            return Err(err.into());
        }
        Ok(customer)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<String, GatewayError> {
        let inner = &self.inner;
        let customer = inner
            .identity_breaker
            .call(|| inner.directory.authenticate(username, password))
            .await
            .inspect_err(|err| warn!(username, error = %err, "login failed"))?;
        let token = inner.auth.issue(username)?;
        info!(username, customer = %customer, "login successful");
        Ok(token)
    }

    /// Validates the caller's credential without performing any operation.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<Principal, GatewayError> {
        Ok(self.inner.auth.authenticate(authorization).await?)
    }

    pub async fn logout(&self, authorization: Option<&str>) -> Result<(), GatewayError> {
        let principal = self.inner.auth.authenticate(authorization).await?;
        self.inner.auth.revoke(&principal).await;
        Ok(())
    }

    /// Credits the customer's account. The idempotency key is honoured
    /// when present.
    pub async fn deposit(
        &self,
        authorization: Option<&str>,
        idempotency_key: Option<&str>,
        customer: CustomerId,
        amount: Decimal,
    ) -> Result<Transaction, GatewayError> {
        self.mutate(TransactionKind::Deposit, authorization, idempotency_key, customer, amount)
            .await
    }

    /// Debits the customer's account. Requires an idempotency key.
    pub async fn withdraw(
        &self,
        authorization: Option<&str>,
        idempotency_key: Option<&str>,
        customer: CustomerId,
        amount: Decimal,
    ) -> Result<Transaction, GatewayError> {
        self.mutate(TransactionKind::Withdraw, authorization, idempotency_key, customer, amount)
            .await
    }

    pub async fn balance(
        &self,
        authorization: Option<&str>,
        customer: CustomerId,
    ) -> Result<Balance, GatewayError> {
        let principal = self.inner.auth.authenticate(authorization).await?;
        self.verify_owner(&principal, customer).await?;
        let inner = &self.inner;
        Ok(inner
            .account_breaker
            .call(|| inner.accounts.balance(customer))
            .await?)
    }

    pub async fn transactions(
        &self,
        authorization: Option<&str>,
        customer: CustomerId,
    ) -> Result<Vec<Transaction>, GatewayError> {
        let principal = self.inner.auth.authenticate(authorization).await?;
        self.verify_owner(&principal, customer).await?;
        let inner = &self.inner;
        Ok(inner
            .account_breaker
            .call(|| inner.accounts.transaction_history(customer))
            .await?)
    }

    pub fn breaker_stats(&self) -> [CircuitStats; 2] {
        [
            self.inner.identity_breaker.stats(),
            self.inner.account_breaker.stats(),
        ]
    }

    /// Drops expired idempotency keys and revocations.
    pub async fn purge_expired(&self, retention: Duration) -> usize {
        self.inner.idempotency.purge(retention).await + self.inner.auth.purge_revocations().await
    }

    async fn mutate(
        &self,
        kind: TransactionKind,
        authorization: Option<&str>,
        idempotency_key: Option<&str>,
        customer: CustomerId,
        amount: Decimal,
    ) -> Result<Transaction, GatewayError> {
        let principal = self.inner.auth.authenticate(authorization).await?;
        self.inner.rate_limiter.check()?;

        let amount = Amount::new(amount)
            .map_err(|_| GatewayError::Validation("amount must be greater than zero".into()))?;
        let idempotency_key = idempotency_key.map(str::trim).filter(|key| !key.is_empty());
        if kind == TransactionKind::Withdraw && idempotency_key.is_none() {
            return Err(GatewayError::Validation(
                "Idempotency-Key header is required".into(),
            ));
        }

        let reserved = match idempotency_key {
            Some(key) => {
                let scoped = IdempotencyGuard::scoped(&principal.username, key);
                match self.inner.idempotency.check_and_reserve(&scoped).await {
                    Reservation::Fresh => Some(scoped),
                    Reservation::Duplicate => return Err(GatewayError::DuplicateRequest),
                }
            }
            None => None,
        };

        let result = self.apply(&principal, kind, customer, amount).await;
        if let (Err(err), Some(key)) = (&result, reserved) {
            if committed_nothing(err) {
                self.inner.idempotency.release(&key).await;
            } else {
                warn!(
                    username = %principal.username,
                    key = %key,
                    error = %err,
                    "outcome unknown, idempotency key kept"
                );
            }
        }
        result
    }

    async fn apply(
        &self,
        principal: &Principal,
        kind: TransactionKind,
        customer: CustomerId,
        amount: Amount,
    ) -> Result<Transaction, GatewayError> {
        self.verify_owner(principal, customer).await?;
        let inner = &self.inner;
        let amount = amount.value();
        let tx = match kind {
            TransactionKind::Deposit => {
                inner
                    .account_breaker
                    .call(|| inner.accounts.deposit(customer, amount))
                    .await?
            }
            TransactionKind::Withdraw => {
                inner
                    .account_breaker
                    .call(|| inner.accounts.withdraw(customer, amount))
                    .await?
            }
        };
        Ok(tx)
    }

    async fn verify_owner(&self, principal: &Principal, customer: CustomerId) -> Result<(), GatewayError> {
        let inner = &self.inner;
        let owned = inner
            .identity_breaker
            .call(|| inner.verifier.verify_ownership(&principal.username, customer))
            .await?;
        if !owned {
            warn!(username = %principal.username, customer = %customer, "ownership check failed");
            return Err(AuthError::NotOwner.into());
        }
        Ok(())
    }
}

/// Whether a failed mutation certainly left the ledger untouched. A timed
/// out call may still commit on the far side, so its key must stay reserved.
fn committed_nothing(err: &GatewayError) -> bool {
    match err {
        GatewayError::Timeout { .. } => false,
        GatewayError::Validation(_)
        | GatewayError::Auth(_)
        | GatewayError::RateLimited { .. }
        | GatewayError::DuplicateRequest
        | GatewayError::CircuitOpen { .. }
        | GatewayError::Ledger(_)
        | GatewayError::Identity(_) => true,
    }
}
