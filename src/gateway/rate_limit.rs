//! Process-wide token bucket in front of the mutating routes.

use crate::config::RateLimitConfig;
use crate::gateway::error::GatewayError;
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota};
use std::num::NonZeroU32;
use tracing::debug;

/// Token bucket: `requests_per_second` refill, `burst_size` capacity.
///
/// Requests are rejected when the bucket is empty; nothing is queued.
pub struct RateLimiter {
    limiter: DefaultDirectRateLimiter,
    clock: DefaultClock,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let quota = Quota::per_second(at_least_one(config.requests_per_second))
            .allow_burst(at_least_one(config.burst_size));
        Self {
            limiter: governor::RateLimiter::direct(quota),
            clock: DefaultClock::default(),
            enabled: config.enabled,
        }
    }

    /// Takes one token, or reports how long until one is available.
    pub fn check(&self) -> Result<(), GatewayError> {
        if !self.enabled {
            return Ok(());
        }
        self.limiter.check().map_err(|not_until| {
            let retry_after = not_until.wait_time_from(self.clock.now());
            debug!(retry_after_ms = retry_after.as_millis() as u64, "rate limit exceeded");
            GatewayError::RateLimited { retry_after }
        })
    }
}

fn at_least_one(value: u32) -> NonZeroU32 {
    NonZeroU32::MIN.saturating_add(value.saturating_sub(1))
}
