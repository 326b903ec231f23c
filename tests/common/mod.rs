#![allow(dead_code)]

use async_trait::async_trait;
use ledger_gateway::application::engine::AccountTransactionEngine;
use ledger_gateway::config::GatewayConfig;
use ledger_gateway::domain::account::{Account, Balance, CustomerId};
use ledger_gateway::domain::transaction::Transaction;
use ledger_gateway::error::LedgerError;
use ledger_gateway::gateway::auth::{AuthGuard, SigningKey};
use ledger_gateway::gateway::idempotency::IdempotencyGuard;
use ledger_gateway::gateway::ports::{AccountService, AccountServiceRef, IdentityVerifierRef};
use ledger_gateway::gateway::rate_limit::RateLimiter;
use ledger_gateway::gateway::{Gateway, GatewayParts};
use ledger_gateway::infrastructure::directory::InMemoryCustomerDirectory;
use ledger_gateway::infrastructure::in_memory::InMemoryLedgerStore;
use ledger_gateway::infrastructure::ttl_store::InMemoryTtlStore;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub fn engine() -> Arc<AccountTransactionEngine> {
    Arc::new(AccountTransactionEngine::new(
        Arc::new(InMemoryLedgerStore::new()),
        Duration::from_secs(2),
    ))
}

/// Generous limits and a fast breaker so tests only trip what they target.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.auth.signing_keys = vec![SigningKey::new("test", "integration-secret")];
    config.rate_limit.requests_per_second = 10_000;
    config.rate_limit.burst_size = 10_000;
    config.circuit_breaker.failure_threshold = 3;
    config.circuit_breaker.open_timeout_secs = 1;
    config.circuit_breaker.call_timeout_ms = 1_000;
    config.auth.password_cost = 4;
    config
}

pub fn directory(config: &GatewayConfig) -> InMemoryCustomerDirectory {
    InMemoryCustomerDirectory::with_cost(config.auth.password_cost)
}

pub struct TestGateway {
    pub gateway: Gateway,
    pub directory: Arc<InMemoryCustomerDirectory>,
}

pub fn gateway_with(
    accounts: AccountServiceRef,
    verifier: Option<IdentityVerifierRef>,
    config: &GatewayConfig,
) -> TestGateway {
    gateway_with_directory(accounts, Arc::new(directory(config)), verifier, config)
}

pub fn gateway_with_directory(
    accounts: AccountServiceRef,
    directory: Arc<InMemoryCustomerDirectory>,
    verifier: Option<IdentityVerifierRef>,
    config: &GatewayConfig,
) -> TestGateway {
    let verifier = verifier.unwrap_or_else(|| directory.clone() as IdentityVerifierRef);
    let gateway = Gateway::new(GatewayParts {
        accounts,
        directory: directory.clone(),
        verifier,
        auth: AuthGuard::new(
            config.auth.signing_keys.clone(),
            config.auth.token_ttl(),
            Arc::new(InMemoryTtlStore::new()),
        ),
        rate_limiter: RateLimiter::new(&config.rate_limit),
        idempotency: IdempotencyGuard::new(
            Arc::new(InMemoryTtlStore::new()),
            config.idempotency.ttl(),
        ),
        breaker: config.circuit_breaker.breaker_config(),
    });
    TestGateway { gateway, directory }
}

pub fn gateway() -> TestGateway {
    gateway_with(engine(), None, &test_config())
}

/// Registers `username` and returns its customer id and a bearer header.
pub async fn sign_up(gateway: &Gateway, username: &str) -> (CustomerId, String) {
    let customer = gateway.register(username, "password").await.unwrap();
    let token = gateway.login(username, "password").await.unwrap();
    (customer, format!("Bearer {token}"))
}

/// Account service that fails with an infrastructure error while `failing`
/// is set, and counts the calls that reach it.
pub struct FlakyAccounts {
    inner: Arc<AccountTransactionEngine>,
    pub failing: AtomicBool,
    pub calls: AtomicUsize,
}

impl FlakyAccounts {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: engine(),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), LedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(LedgerError::StoreUnavailable("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AccountService for FlakyAccounts {
    async fn create_account(&self, customer: CustomerId) -> Result<Account, LedgerError> {
        self.check()?;
        self.inner.create_account(customer).await
    }

    async fn deposit(&self, customer: CustomerId, amount: Decimal) -> Result<Transaction, LedgerError> {
        self.check()?;
        self.inner.deposit(customer, amount).await
    }

    async fn withdraw(&self, customer: CustomerId, amount: Decimal) -> Result<Transaction, LedgerError> {
        self.check()?;
        self.inner.withdraw(customer, amount).await
    }

    async fn balance(&self, customer: CustomerId) -> Result<Balance, LedgerError> {
        self.check()?;
        self.inner.balance(customer).await
    }

    async fn transaction_history(&self, customer: CustomerId) -> Result<Vec<Transaction>, LedgerError> {
        self.check()?;
        self.inner.transaction_history(customer).await
    }
}
