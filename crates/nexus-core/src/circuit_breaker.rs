//! Circuit breaker guarding a single upstream endpoint.
//!
//! Tracks consecutive failures and stops issuing requests once the endpoint
//! looks unreachable or degraded. After a cooldown a trial request is let
//! through to probe for recovery.
//!
//! # Circuit States
//!
//! ```text
//! CLOSED (healthy) --[N failures]--> OPEN (rejecting) --[timeout]--> HALF_OPEN (probing)
//!                                                                         |
//!                                       <--[failure]--                    |
//!                                                                         |
//! CLOSED <---------------------------[success]----------------------------+
//! ```
//!
//! Time is read from tokio's clock, so tests can pause and advance it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

/// Current state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed - requests flow normally.
    Closed,
    /// Circuit is open - requests are rejected immediately.
    Open,
    /// Circuit is half-open - a trial request is allowed to test recovery.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit. Must be >= 1.
    pub failure_threshold: u32,

    /// Time after the last failure before an open circuit admits a trial request.
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct CircuitBreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Statistics about circuit breaker state for monitoring.
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub time_until_half_open: Option<Duration>,
}

/// Thread-safe circuit breaker for one upstream endpoint.
///
/// Cloning shares the underlying state.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<CircuitBreakerInner>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let config = CircuitBreakerConfig {
            failure_threshold: config.failure_threshold.max(1),
            ..config
        };
        Self {
            name: name.into(),
            config,
            inner: Arc::new(Mutex::new(CircuitBreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_time: None,
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Acquires the inner mutex lock, recovering from poison if necessary.
    fn lock_inner(&self) -> std::sync::MutexGuard<'_, CircuitBreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(circuit = %self.name, "Recovered from poisoned mutex");
            poisoned.into_inner()
        })
    }

    /// Returns the current state without triggering any transition.
    pub fn state(&self) -> CircuitState {
        self.lock_inner().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock_inner().failure_count
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.lock_inner();

        let time_until_half_open = match (inner.state, inner.last_failure_time) {
            (CircuitState::Open, Some(t)) => {
                Some(self.config.open_timeout.saturating_sub(t.elapsed()))
            }
            _ => None,
        };

        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            time_until_half_open,
        }
    }

    /// Decides whether a request may be issued now.
    ///
    /// An open circuit whose timeout has elapsed moves to half-open and lets
    /// the caller through as the trial request.
    pub fn is_allowed(&self) -> bool {
        let mut inner = self.lock_inner();

        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled_down = inner
                    .last_failure_time
                    .is_none_or(|t| t.elapsed() > self.config.open_timeout);
                if cooled_down {
                    tracing::info!(
                        circuit = %self.name,
                        "Circuit breaker transitioning to half-open state"
                    );
                    inner.state = CircuitState::HalfOpen;
                }
                cooled_down
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock_inner();

        if inner.state != CircuitState::Closed {
            tracing::info!(
                circuit = %self.name,
                previous = %inner.state,
                "Circuit breaker closing after successful request"
            );
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock_inner();

        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure_time = Some(Instant::now());

        if inner.failure_count >= self.config.failure_threshold {
            if inner.state != CircuitState::Open {
                tracing::warn!(
                    circuit = %self.name,
                    failures = inner.failure_count,
                    "Circuit breaker opening after {} consecutive failures",
                    inner.failure_count
                );
            }
            inner.state = CircuitState::Open;
        }
    }
}
