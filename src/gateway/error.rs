use crate::error::{ErrorKind, LedgerError};
use crate::gateway::auth::AuthError;
use crate::gateway::circuit_breaker::{CircuitError, FailureClass};
use std::time::Duration;
use thiserror::Error;

/// Failures reported by the identity collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("username already taken")]
    UsernameTaken,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid username: {0}")]
    InvalidUsername(String),
    #[error("invalid password: {0}")]
    InvalidPassword(String),
    #[error("identity service unavailable: {0}")]
    Unavailable(String),
}

impl IdentityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IdentityError::UsernameTaken
            | IdentityError::InvalidUsername(_)
            | IdentityError::InvalidPassword(_) => ErrorKind::Validation,
            IdentityError::InvalidCredentials => ErrorKind::Auth,
            IdentityError::Unavailable(_) => ErrorKind::TransientInfra,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            IdentityError::UsernameTaken => "username_taken",
            IdentityError::InvalidCredentials => "invalid_credentials",
            IdentityError::InvalidUsername(_) => "invalid_username",
            IdentityError::InvalidPassword(_) => "invalid_password",
            IdentityError::Unavailable(_) => "identity_unavailable",
        }
    }
}

impl FailureClass for IdentityError {
    fn is_infra_failure(&self) -> bool {
        matches!(self, IdentityError::Unavailable(_))
    }
}

impl FailureClass for LedgerError {
    fn is_infra_failure(&self) -> bool {
        self.is_transient()
    }
}

/// Everything that can leave the gateway, each with a stable kind and code.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("rate limit exceeded")]
    RateLimited { retry_after: Duration },
    #[error("duplicate request")]
    DuplicateRequest,
    #[error("{target} service temporarily unavailable")]
    CircuitOpen {
        target: &'static str,
        retry_after: Duration,
    },
    #[error("{target} service timed out")]
    Timeout { target: &'static str },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Validation(_) => ErrorKind::Validation,
            GatewayError::Auth(_) => ErrorKind::Auth,
            GatewayError::RateLimited { .. } => ErrorKind::Overload,
            GatewayError::DuplicateRequest => ErrorKind::DuplicateRequest,
            GatewayError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            GatewayError::Timeout { .. } => ErrorKind::TransientInfra,
            GatewayError::Ledger(err) => err.kind(),
            GatewayError::Identity(err) => err.kind(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Validation(_) => "invalid_request",
            GatewayError::Auth(err) => err.code(),
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::DuplicateRequest => "duplicate_request",
            GatewayError::CircuitOpen { .. } => "circuit_open",
            GatewayError::Timeout { .. } => "downstream_timeout",
            GatewayError::Ledger(err) => err.code(),
            GatewayError::Identity(err) => err.code(),
        }
    }

    /// Seconds a client should wait before retrying, when known.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayError::RateLimited { retry_after }
            | GatewayError::CircuitOpen { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

impl<E> From<CircuitError<E>> for GatewayError
where
    GatewayError: From<E>,
{
    fn from(err: CircuitError<E>) -> Self {
        match err {
            CircuitError::Open {
                target,
                retry_after,
            } => GatewayError::CircuitOpen {
                target,
                retry_after,
            },
            CircuitError::Timeout { target } => GatewayError::Timeout { target },
            CircuitError::Inner(inner) => inner.into(),
        }
    }
}
