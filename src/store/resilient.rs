//! Circuit-breaking decorator for a score store.

use super::{ScoreStore, ScriptArg, ScriptHandle};
use crate::error::LimitResult;
use crate::resilience::CircuitBreaker;
use async_trait::async_trait;
use redis::Value;
use std::time::Duration;

/// Score store decorated by a circuit breaker.
///
/// While the breaker is open every operation fails with `CIRCUIT_OPEN`
/// without touching the inner store. No retry, no backoff.
#[derive(Debug)]
pub struct ResilientScoreStore<S> {
    inner: S,
    breaker: CircuitBreaker,
}

impl<S: ScoreStore> ResilientScoreStore<S> {
    /// Wrap `inner` with a breaker tripping after `max_failures` consecutive
    /// failures and recovering after `timeout`.
    #[must_use]
    pub fn new(inner: S, max_failures: u32, timeout: Duration) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new(max_failures, timeout),
        }
    }

    /// The breaker guarding this store.
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[async_trait]
impl<S: ScoreStore> ScoreStore for ResilientScoreStore<S> {
    async fn eval(
        &self,
        script: &ScriptHandle,
        keys: &[&str],
        args: &[ScriptArg],
    ) -> LimitResult<Value> {
        self.breaker
            .execute(|| self.inner.eval(script, keys, args))
            .await
    }

    async fn get(&self, key: &str) -> LimitResult<Option<String>> {
        self.breaker.execute(|| self.inner.get(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> LimitResult<()> {
        self.breaker
            .execute(|| self.inner.set(key, value, ttl_seconds))
            .await
    }

    async fn incr(&self, key: &str) -> LimitResult<i64> {
        self.breaker.execute(|| self.inner.incr(key)).await
    }

    async fn ping(&self) -> LimitResult<()> {
        self.breaker.execute(|| self.inner.ping()).await
    }
}
