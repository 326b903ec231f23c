//! Client-facing gateway and its resilience guards.
//!
//! The gateway owns no balances. It authenticates the caller, applies rate
//! limiting and idempotency, confirms ownership with the identity service and
//! forwards typed calls to the account ledger, each downstream target behind
//! its own circuit breaker.

pub mod auth;
pub mod circuit_breaker;
pub mod error;
pub mod idempotency;
pub mod ports;
pub mod rate_limit;
pub mod service;

pub use error::GatewayError;
pub use service::{Gateway, GatewayParts};
