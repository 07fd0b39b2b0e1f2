//! Three-state circuit breaker.
//!
//! Wraps a fallible async operation. Transitions happen in two critical
//! sections bracketing the call; the call itself runs outside the lock.

use crate::error::{LimitError, LimitResult};
use std::future::Future;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation; calls pass through.
    Closed,
    /// Rejecting all calls until the recovery timeout elapses.
    Open,
    /// Probing: the next call is let through to test recovery.
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    last_fail: Option<Instant>,
}

/// Circuit breaker guarding a fallible operation.
///
/// Closed passes calls through and counts failures; at `max_failures` the
/// breaker opens and rejects everything with [`LimitError::CircuitOpen`]
/// until `timeout` has elapsed since the last failure, after which the
/// first call probes in half-open state. A half-open success closes the
/// breaker, a half-open failure reopens it.
#[derive(Debug)]
pub struct CircuitBreaker {
    max_failures: u32,
    timeout: Duration,
    inner: RwLock<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker in the closed state.
    #[must_use]
    pub fn new(max_failures: u32, timeout: Duration) -> Self {
        Self {
            max_failures,
            timeout,
            inner: RwLock::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                last_fail: None,
            }),
        }
    }

    /// Run `operation` through the breaker.
    ///
    /// Returns [`LimitError::CircuitOpen`] without invoking the operation
    /// when the breaker is open and the recovery timeout has not elapsed.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> LimitResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LimitResult<T>>,
    {
        self.before_call()?;
        let result = operation().await;
        self.after_call(result.is_ok());
        result
    }

    /// Current state, under a shared lock.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.read().unwrap().state
    }

    /// Consecutive failure count, under a shared lock.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.inner.read().unwrap().failures
    }

    fn before_call(&self) -> LimitResult<()> {
        let mut inner = self.inner.write().unwrap();
        match inner.state {
            CircuitState::Open => {
                let timed_out = inner
                    .last_fail
                    .map_or(true, |at| at.elapsed() > self.timeout);
                if timed_out {
                    inner.state = CircuitState::HalfOpen;
                    inner.failures = 0;
                    info!("circuit breaker half-open, probing");
                    Ok(())
                } else {
                    Err(LimitError::CircuitOpen)
                }
            },
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
        }
    }

    fn after_call(&self, ok: bool) {
        let mut inner = self.inner.write().unwrap();
        if ok {
            if inner.state == CircuitState::HalfOpen {
                info!("circuit breaker closed");
                inner.state = CircuitState::Closed;
            }
            inner.failures = 0;
            return;
        }

        inner.failures += 1;
        inner.last_fail = Some(Instant::now());
        if inner.state == CircuitState::HalfOpen || inner.failures >= self.max_failures {
            if inner.state != CircuitState::Open {
                warn!(failures = inner.failures, "circuit breaker opened");
            }
            inner.state = CircuitState::Open;
        } else {
            debug!(
                failures = inner.failures,
                max_failures = self.max_failures,
                "circuit breaker recorded failure"
            );
        }
    }
}
