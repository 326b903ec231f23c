//! Service configuration with validation.
//!
//! Every field has a default, so a TOML file only needs the values it
//! overrides. Durations are plain integers with the unit in the field name.

use crate::gateway::auth::SigningKey;
use crate::gateway::circuit_breaker::CircuitBreakerConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),
    #[error("invalid circuit breaker settings: {0}")]
    InvalidCircuitBreaker(String),
    #[error("invalid idempotency settings: {0}")]
    InvalidIdempotency(String),
    #[error("invalid auth settings: {0}")]
    InvalidAuth(String),
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
}

/// Main service configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub idempotency: IdempotencyConfig,
    pub circuit_breaker: BreakerSettings,
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub token_ttl_secs: u64,
    /// The first key signs new tokens; all keys verify.
    pub signing_keys: Vec<SigningKey>,
    /// bcrypt work factor for stored passwords.
    pub password_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: 24 * 60 * 60,
            signing_keys: Vec::new(),
            password_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl AuthConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 100,
            burst_size: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// How long a key rejects repeats.
    pub ttl_secs: u64,
    /// How long a key is kept before it is physically purged.
    pub retention_secs: u64,
    pub purge_interval_secs: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            retention_secs: 600,
            purge_interval_secs: 60,
        }
    }
}

impl IdempotencyConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub failure_window_secs: u64,
    pub open_timeout_secs: u64,
    pub half_open_max_calls: u32,
    pub call_timeout_ms: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            failure_window_secs: 60,
            open_timeout_secs: 30,
            half_open_max_calls: 1,
            call_timeout_ms: 5_000,
        }
    }
}

impl BreakerSettings {
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            failure_window: Duration::from_secs(self.failure_window_secs),
            open_timeout: Duration::from_secs(self.open_timeout_secs),
            half_open_max_calls: self.half_open_max_calls,
            call_timeout: Duration::from_millis(self.call_timeout_ms),
            enabled: self.enabled,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub lock_timeout_ms: u64,
    /// RocksDB directory; in-memory storage when unset.
    pub db_path: Option<PathBuf>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 2_000,
            db_path: None,
        }
    }
}

impl LedgerConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl GatewayConfig {
    /// Reads a TOML file. Missing sections and fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.requests_per_second == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "requests_per_second cannot be 0".into(),
            ));
        }
        if self.rate_limit.burst_size == 0 {
            return Err(ConfigError::InvalidRateLimit("burst_size cannot be 0".into()));
        }

        let breaker = &self.circuit_breaker;
        if breaker.failure_threshold == 0 {
            return Err(ConfigError::InvalidCircuitBreaker(
                "failure_threshold cannot be 0".into(),
            ));
        }
        if breaker.half_open_max_calls == 0 {
            return Err(ConfigError::InvalidCircuitBreaker(
                "half_open_max_calls cannot be 0".into(),
            ));
        }
        if breaker.call_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout("call_timeout_ms cannot be 0".into()));
        }
        if self.ledger.lock_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout("lock_timeout_ms cannot be 0".into()));
        }

        let idempotency = &self.idempotency;
        if idempotency.ttl_secs == 0 {
            return Err(ConfigError::InvalidIdempotency("ttl_secs cannot be 0".into()));
        }
        if idempotency.retention_secs < idempotency.ttl_secs {
            return Err(ConfigError::InvalidIdempotency(
                "retention_secs cannot be shorter than ttl_secs".into(),
            ));
        }
        if idempotency.purge_interval_secs == 0 {
            return Err(ConfigError::InvalidIdempotency(
                "purge_interval_secs cannot be 0".into(),
            ));
        }

        if self.auth.token_ttl_secs == 0 {
            return Err(ConfigError::InvalidAuth("token_ttl_secs cannot be 0".into()));
        }
        if !(4..=31).contains(&self.auth.password_cost) {
            return Err(ConfigError::InvalidAuth(format!(
                "password_cost must be between 4 and 31, got {}",
                self.auth.password_cost
            )));
        }
        if self.auth.signing_keys.is_empty() {
            return Err(ConfigError::InvalidAuth("no signing key configured".into()));
        }
        if let Some(key) = self
            .auth
            .signing_keys
            .iter()
            .find(|key| key.secret.is_empty() || key.kid.is_empty())
        {
            return Err(ConfigError::InvalidAuth(format!(
                "signing key '{}' needs a non-empty kid and secret",
                key.kid
            )));
        }

        Ok(())
    }
}
