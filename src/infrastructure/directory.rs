use crate::domain::account::CustomerId;
use crate::gateway::error::IdentityError;
use crate::gateway::ports::{CustomerDirectory, IdentityVerifier};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::info;

struct CustomerRecord {
    id: CustomerId,
    password_hash: String,
}

/// Customer registry owning usernames, credentials and customer ids.
///
/// Ids are assigned sequentially. Passwords are kept as bcrypt hashes,
/// computed on the blocking pool.
#[derive(Clone)]
pub struct InMemoryCustomerDirectory {
    customers: Arc<DashMap<String, CustomerRecord>>,
    next_id: Arc<AtomicU32>,
    cost: u32,
}

impl Default for InMemoryCustomerDirectory {
    fn default() -> Self {
        Self::with_cost(bcrypt::DEFAULT_COST)
    }
}

impl InMemoryCustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cost(cost: u32) -> Self {
        Self {
            customers: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU32::new(1)),
            cost,
        }
    }

    /// Continues numbering after `last`, the highest customer id the ledger
    /// already holds, so a fresh directory never hands out an existing
    /// customer's id.
    pub fn starting_after(self, last: Option<CustomerId>) -> Self {
        let first = last.map_or(1, |CustomerId(id)| id.saturating_add(1));
        self.next_id.store(first, Ordering::SeqCst);
        self
    }

    async fn hash(&self, password: &str) -> Result<String, IdentityError> {
        let password = password.to_string();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|err| IdentityError::Unavailable(err.to_string()))?
            .map_err(|err| IdentityError::Unavailable(err.to_string()))
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryCustomerDirectory {
    async fn register(&self, username: &str, password: &str) -> Result<CustomerId, IdentityError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(IdentityError::InvalidUsername("username must not be empty".into()));
        }
        if password.is_empty() {
            return Err(IdentityError::InvalidPassword("password must not be empty".into()));
        }
        if self.customers.contains_key(username) {
            return Err(IdentityError::UsernameTaken);
        }

        let password_hash = self.hash(password).await?;
        match self.customers.entry(username.to_string()) {
            Entry::Occupied(_) => Err(IdentityError::UsernameTaken),
            Entry::Vacant(vacant) => {
                let id = CustomerId(self.next_id.fetch_add(1, Ordering::SeqCst));
                vacant.insert(CustomerRecord { id, password_hash });
                info!(customer = %id, username, "customer registered");
                Ok(id)
            }
        }
    }

    async fn unregister(&self, username: &str, customer: CustomerId) -> Result<(), IdentityError> {
        let username = username.trim();
        if self
            .customers
            .remove_if(username, |_, record| record.id == customer)
            .is_some()
        {
            info!(customer = %customer, username, "customer registration rolled back");
        }
        Ok(())
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<CustomerId, IdentityError> {
        let (id, password_hash) = self
            .customers
            .get(username.trim())
            .map(|record| (record.id, record.password_hash.clone()))
            .ok_or(IdentityError::InvalidCredentials)?;

        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &password_hash))
            .await
            .map_err(|err| IdentityError::Unavailable(err.to_string()))?
            .unwrap_or(false);
        if matches {
            Ok(id)
        } else {
            Err(IdentityError::InvalidCredentials)
        }
    }
}

#[async_trait]
impl IdentityVerifier for InMemoryCustomerDirectory {
    async fn verify_ownership(&self, username: &str, customer: CustomerId) -> Result<bool, IdentityError> {
        Ok(self
            .customers
            .get(username)
            .is_some_and(|record| record.id == customer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> InMemoryCustomerDirectory {
        InMemoryCustomerDirectory::with_cost(4)
    }

    #[tokio::test]
    async fn test_register_assigns_sequential_ids() {
        let directory = directory();
        assert_eq!(directory.register("alice", "pw").await.unwrap(), CustomerId(1));
        assert_eq!(directory.register("bob", "pw").await.unwrap(), CustomerId(2));
        assert_eq!(
            directory.register("alice", "other").await,
            Err(IdentityError::UsernameTaken)
        );
    }

    #[tokio::test]
    async fn test_register_validates_input() {
        let directory = directory();
        assert!(matches!(
            directory.register("  ", "pw").await,
            Err(IdentityError::InvalidUsername(_))
        ));
        assert!(matches!(
            directory.register("alice", "").await,
            Err(IdentityError::InvalidPassword(_))
        ));
    }

    #[tokio::test]
    async fn test_authenticate() {
        let directory = directory();
        let id = directory.register("alice", "secret").await.unwrap();
        assert_eq!(directory.authenticate("alice", "secret").await, Ok(id));
        assert_eq!(
            directory.authenticate("alice", "wrong").await,
            Err(IdentityError::InvalidCredentials)
        );
        assert_eq!(
            directory.authenticate("nobody", "secret").await,
            Err(IdentityError::InvalidCredentials)
        );
    }

    #[tokio::test]
    async fn test_passwords_are_stored_as_bcrypt_hashes() {
        let directory = directory();
        directory.register("alice", "same").await.unwrap();
        directory.register("bob", "same").await.unwrap();
        let alice = directory.customers.get("alice").unwrap().password_hash.clone();
        let bob = directory.customers.get("bob").unwrap().password_hash.clone();
        assert!(alice.starts_with("$2"));
        assert!(!alice.contains("same"));
        assert_ne!(alice, bob);
        assert!(bcrypt::verify("same", &alice).unwrap());
    }

    #[tokio::test]
    async fn test_verify_ownership() {
        let directory = directory();
        let alice = directory.register("alice", "pw").await.unwrap();
        let bob = directory.register("bob", "pw").await.unwrap();

        assert_eq!(directory.verify_ownership("alice", alice).await, Ok(true));
        assert_eq!(directory.verify_ownership("alice", bob).await, Ok(false));
        assert_eq!(directory.verify_ownership("ghost", alice).await, Ok(false));
    }

    #[tokio::test]
    async fn test_unregister_frees_username() {
        let directory = directory();
        let alice = directory.register("alice", "pw").await.unwrap();

        // A mismatched id leaves the record alone.
        directory.unregister("alice", CustomerId(99)).await.unwrap();
        assert_eq!(directory.authenticate("alice", "pw").await, Ok(alice));

        directory.unregister(" alice ", alice).await.unwrap();
        assert_eq!(
            directory.authenticate("alice", "pw").await,
            Err(IdentityError::InvalidCredentials)
        );
        assert_eq!(directory.verify_ownership("alice", alice).await, Ok(false));
        assert!(directory.register("alice", "pw").await.is_ok());
    }

    #[tokio::test]
    async fn test_starting_after_skips_existing_ids() {
        let directory = directory().starting_after(Some(CustomerId(41)));
        assert_eq!(directory.register("alice", "pw").await.unwrap(), CustomerId(42));

        let empty = self::directory().starting_after(None);
        assert_eq!(empty.register("bob", "pw").await.unwrap(), CustomerId(1));
    }
}
