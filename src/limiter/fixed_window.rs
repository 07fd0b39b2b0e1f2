//! Fixed-window limiter.

use super::{decode_verdict, epoch_secs, Limiter, RateLimitInfo};
use crate::error::{LimitError, LimitResult};
use crate::snapshot::AlgorithmConfig;
use crate::store::{ScoreStore, ScriptHandle};
use async_trait::async_trait;
use std::sync::Arc;

/// Counter limiter over a window anchored at the first hit.
///
/// The script increments the counter at the key, sets the TTL to the window
/// length when the counter is new, and reports the remaining TTL; clients
/// in the same window therefore see a deterministic reset time.
pub struct FixedWindowLimiter {
    store: Arc<dyn ScoreStore>,
    script: ScriptHandle,
}

impl FixedWindowLimiter {
    /// Bind the limiter to a store and its script.
    #[must_use]
    pub fn new(store: Arc<dyn ScoreStore>, script: ScriptHandle) -> Self {
        Self { store, script }
    }

    /// Registry factory.
    pub fn factory(store: Arc<dyn ScoreStore>, script: ScriptHandle) -> Arc<dyn Limiter> {
        Arc::new(Self::new(store, script))
    }
}

#[async_trait]
impl Limiter for FixedWindowLimiter {
    async fn allow(&self, key: &str, cfg: &AlgorithmConfig) -> LimitResult<RateLimitInfo> {
        let AlgorithmConfig::FixedWindow(cfg) = cfg else {
            return Err(LimitError::InvalidConfig(format!(
                "fixed_window limiter received '{}' config",
                cfg.algorithm_name()
            )));
        };

        let value = self
            .store
            .eval(
                &self.script,
                &[key],
                &[cfg.window.into(), cfg.limit.into()],
            )
            .await?;

        let (allowed, _, remaining, ttl) = decode_verdict(value)?;
        let reset_time = if ttl > 0 { epoch_secs() + ttl } else { 0 };

        Ok(RateLimitInfo {
            allowed: allowed == 1,
            limit: cfg.limit,
            remaining,
            reset_time,
        })
    }
}
