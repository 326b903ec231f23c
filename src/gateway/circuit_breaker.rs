//! Circuit breaker for downstream target resilience.
//!
//! Each downstream target (identity verification, account ledger) gets its
//! own `CircuitBreaker`, so a failing target never isolates a healthy one.
//!
//! # Circuit Breaker States
//!
//! ```text
//!                 success / domain outcome
//!            ┌──────────────────────────────────┐
//!            ▼                                  │
//!      ┌──────────┐  failures   ┌──────────┐  cooldown  ┌───────────┐
//!      │  CLOSED  │ ──────────► │   OPEN   │ ─────────► │ HALF-OPEN │
//!      │ (normal) │  threshold  │ (reject) │  elapsed   │  (trial)  │
//!      └──────────┘             └──────────┘ ◄───────── └───────────┘
//!                                             trial failure
//! ```
//!
//! Only failures classified as infrastructure faults count. A domain outcome
//! such as insufficient funds proves the target is healthy and is treated
//! as a success.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Distinguishes infrastructure faults from legitimate outcomes.
pub trait FailureClass {
    fn is_infra_failure(&self) -> bool;
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - calls pass through
    Closed,
    /// Calls fail immediately without reaching the target
    Open,
    /// A limited number of trial calls are let through
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Infra failures within `failure_window` that open the circuit
    pub failure_threshold: u32,
    /// Rolling window in which failures are counted
    pub failure_window: Duration,
    /// Cooldown before an open circuit lets trial calls through
    pub open_timeout: Duration,
    /// Concurrent trial calls allowed while half-open
    pub half_open_max_calls: u32,
    /// Upper bound on a single downstream call
    pub call_timeout: Duration,
    pub enabled: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            open_timeout: Duration::from_secs(30),
            half_open_max_calls: 1,
            call_timeout: Duration::from_secs(5),
            enabled: true,
        }
    }
}

/// Outcome of a call made through a breaker.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CircuitError<E> {
    #[error("circuit open for {target}, retry after {retry_after:?}")]
    Open {
        target: &'static str,
        retry_after: Duration,
    },
    #[error("call to {target} timed out")]
    Timeout { target: &'static str },
    #[error(transparent)]
    Inner(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

struct CircuitInner {
    state: CircuitState,
    /// Times of recent infra failures while closed, oldest first.
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    trials_in_flight: u32,
    last_transition: Instant,
    total_calls: u64,
    total_failures: u64,
    total_rejected: u64,
}

impl CircuitInner {
    fn new(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            opened_at: None,
            trials_in_flight: 0,
            last_transition: now,
            total_calls: 0,
            total_failures: 0,
            total_rejected: 0,
        }
    }

    fn transition(&mut self, state: CircuitState, now: Instant) {
        self.state = state;
        self.last_transition = now;
        match state {
            CircuitState::Closed => {
                self.failures.clear();
                self.opened_at = None;
                self.trials_in_flight = 0;
            }
            CircuitState::Open => {
                self.failures.clear();
                self.opened_at = Some(now);
                self.trials_in_flight = 0;
            }
            CircuitState::HalfOpen => {
                self.trials_in_flight = 0;
            }
        }
    }
}

/// Statistics for a circuit breaker
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStats {
    pub target: &'static str,
    pub state: CircuitState,
    pub failure_count: u32,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_rejected: u64,
    pub time_in_state_ms: u64,
}

/// Guards calls to one downstream target.
///
/// All state transitions happen under a single lock, so concurrent callers
/// observe a consistent state machine.
pub struct CircuitBreaker {
    target: &'static str,
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    pub fn new(target: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            target,
            config,
            inner: Mutex::new(CircuitInner::new(Instant::now())),
        }
    }

    pub fn target(&self) -> &'static str {
        self.target
    }

    /// Runs `call` unless the circuit is open.
    ///
    /// The call is bounded by `call_timeout`; a timeout counts as an infra
    /// failure. Dropping the returned future before it completes abandons
    /// the call without recording an outcome.
    pub async fn call<T, E, F, Fut>(&self, call: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: FailureClass,
    {
        if !self.config.enabled {
            return match tokio::time::timeout(self.config.call_timeout, call()).await {
                Ok(result) => result.map_err(CircuitError::Inner),
                Err(_) => Err(CircuitError::Timeout {
                    target: self.target,
                }),
            };
        }

        let admission = self.admit().map_err(|retry_after| CircuitError::Open {
            target: self.target,
            retry_after,
        })?;
        let mut pending = PendingCall {
            breaker: self,
            admission,
            settled: false,
        };

        match tokio::time::timeout(self.config.call_timeout, call()).await {
            Err(_) => {
                pending.settle(false);
                Err(CircuitError::Timeout {
                    target: self.target,
                })
            }
            Ok(Err(err)) if err.is_infra_failure() => {
                pending.settle(false);
                Err(CircuitError::Inner(err))
            }
            Ok(result) => {
                pending.settle(true);
                result.map_err(CircuitError::Inner)
            }
        }
    }

    /// Current state, reporting HalfOpen once an open circuit's cooldown
    /// has elapsed.
    pub fn state(&self) -> CircuitState {
        self.effective_state(&self.inner.lock())
    }

    pub fn stats(&self) -> CircuitStats {
        let inner = self.inner.lock();
        let now = Instant::now();
        let window = self.config.failure_window;
        CircuitStats {
            target: self.target,
            state: self.effective_state(&inner),
            failure_count: inner
                .failures
                .iter()
                .filter(|at| now.duration_since(**at) <= window)
                .count() as u32,
            total_calls: inner.total_calls,
            total_failures: inner.total_failures,
            total_rejected: inner.total_rejected,
            time_in_state_ms: inner.last_transition.elapsed().as_millis() as u64,
        }
    }

    /// Forces the circuit closed (for operators).
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        info!(target_service = self.target, "circuit breaker manually reset");
        inner.transition(CircuitState::Closed, Instant::now());
    }

    fn effective_state(&self, inner: &CircuitInner) -> CircuitState {
        match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(opened_at))
                if opened_at.elapsed() >= self.config.open_timeout =>
            {
                CircuitState::HalfOpen
            }
            (state, _) => state,
        }
    }

    fn admit(&self) -> Result<Admission, Duration> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.total_calls += 1;

        match inner.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|opened_at| now.duration_since(opened_at))
                    .unwrap_or(self.config.open_timeout);
                if elapsed >= self.config.open_timeout {
                    info!(
                        target_service = self.target,
                        "circuit breaker transitioning to half-open"
                    );
                    inner.transition(CircuitState::HalfOpen, now);
                    inner.trials_in_flight = 1;
                    Ok(Admission::Trial)
                } else {
                    inner.total_rejected += 1;
                    let remaining = self.config.open_timeout - elapsed;
                    debug!(
                        target_service = self.target,
                        remaining_ms = remaining.as_millis() as u64,
                        "circuit breaker is open, rejecting call"
                    );
                    Err(remaining)
                }
            }
            CircuitState::HalfOpen => {
                if inner.trials_in_flight < self.config.half_open_max_calls {
                    inner.trials_in_flight += 1;
                    Ok(Admission::Trial)
                } else {
                    inner.total_rejected += 1;
                    Err(self.config.call_timeout)
                }
            }
        }
    }

    fn record(&self, admission: Admission, healthy: bool) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        if !healthy {
            inner.total_failures += 1;
        }

        match (inner.state, healthy) {
            (CircuitState::Closed, true) => {
                inner.failures.clear();
            }
            (CircuitState::Closed, false) => {
                let window = self.config.failure_window;
                while inner
                    .failures
                    .front()
                    .is_some_and(|at| now.duration_since(*at) > window)
                {
                    inner.failures.pop_front();
                }
                inner.failures.push_back(now);
                let failures = inner.failures.len() as u32;
                if failures >= self.config.failure_threshold {
                    warn!(
                        target_service = self.target,
                        failures,
                        threshold = self.config.failure_threshold,
                        cooldown_ms = self.config.open_timeout.as_millis() as u64,
                        "circuit breaker opening due to failures"
                    );
                    inner.transition(CircuitState::Open, now);
                }
            }
            (CircuitState::HalfOpen, true) if admission == Admission::Trial => {
                info!(
                    target_service = self.target,
                    "circuit breaker closing after successful trial"
                );
                inner.transition(CircuitState::Closed, now);
            }
            (CircuitState::HalfOpen, false) if admission == Admission::Trial => {
                warn!(
                    target_service = self.target,
                    "circuit breaker reopening after trial failure"
                );
                inner.transition(CircuitState::Open, now);
            }
            // Late outcomes of calls admitted before the circuit opened.
            _ => {}
        }
    }

    fn abandon(&self, admission: Admission) {
        if admission != Admission::Trial {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
        }
    }
}

struct PendingCall<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    settled: bool,
}

impl PendingCall<'_> {
    fn settle(&mut self, healthy: bool) {
        self.settled = true;
        self.breaker.record(self.admission, healthy);
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.abandon(self.admission);
        }
    }
}
