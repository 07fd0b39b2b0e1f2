//! Sliding-window limiter.

use super::{decode_verdict, epoch_millis, Limiter, RateLimitInfo};
use crate::error::{LimitError, LimitResult};
use crate::snapshot::AlgorithmConfig;
use crate::store::{ScoreStore, ScriptHandle};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Timestamp-log limiter over a sliding window.
///
/// The script keeps a sorted set scored by request timestamp, evicts
/// entries older than the window on every call, and admits the request when
/// the surviving count is below the limit. Each call adds a member under a
/// fresh random id; reusing ids would deduplicate inside the sorted set and
/// under-count.
pub struct SlidingWindowLimiter {
    store: Arc<dyn ScoreStore>,
    script: ScriptHandle,
}

impl SlidingWindowLimiter {
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
impl Limiter for SlidingWindowLimiter {
    async fn allow(&self, key: &str, cfg: &AlgorithmConfig) -> LimitResult<RateLimitInfo> {
        let AlgorithmConfig::SlidingWindow(cfg) = cfg else {
            return Err(LimitError::InvalidConfig(format!(
                "sliding_window limiter received '{}' config",
                cfg.algorithm_name()
            )));
        };

        let now_ms = epoch_millis();
        let request_id = Uuid::new_v4().to_string();
        let window_ms = cfg.window * 1000;

        let value = self
            .store
            .eval(
                &self.script,
                &[key],
                &[
                    window_ms.into(),
                    cfg.limit.into(),
                    now_ms.into(),
                    request_id.into(),
                ],
            )
            .await?;

        let (allowed, _, remaining, reset_time) = decode_verdict(value)?;

        Ok(RateLimitInfo {
            allowed: allowed == 1,
            limit: cfg.limit,
            remaining,
            reset_time,
        })
    }
}
