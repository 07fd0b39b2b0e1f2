//! Token-bucket limiter.

use super::{decode_verdict, epoch_secs, Limiter, RateLimitInfo};
use crate::error::{LimitError, LimitResult};
use crate::snapshot::AlgorithmConfig;
use crate::store::{ScoreStore, ScriptHandle};
use async_trait::async_trait;
use std::sync::Arc;

/// Tokens consumed per request.
const TOKENS_PER_REQUEST: i64 = 1;

/// Refilling-bucket limiter.
///
/// The script stores `{tokens, last_refill}` in a hash at the key, refills
/// by `refill_rate` tokens per elapsed second up to `capacity`, and
/// consumes one token when available. Bucket state expires after
/// `bucket_ttl` seconds of inactivity.
pub struct TokenBucketLimiter {
    store: Arc<dyn ScoreStore>,
    script: ScriptHandle,
}

impl TokenBucketLimiter {
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
impl Limiter for TokenBucketLimiter {
    async fn allow(&self, key: &str, cfg: &AlgorithmConfig) -> LimitResult<RateLimitInfo> {
        let AlgorithmConfig::TokenBucket(cfg) = cfg else {
            return Err(LimitError::InvalidConfig(format!(
                "token_bucket limiter received '{}' config",
                cfg.algorithm_name()
            )));
        };

        let now = epoch_secs();
        let value = self
            .store
            .eval(
                &self.script,
                &[key],
                &[
                    cfg.capacity.into(),
                    cfg.refill_rate.into(),
                    TOKENS_PER_REQUEST.into(),
                    now.into(),
                    cfg.bucket_ttl.into(),
                ],
            )
            .await?;

        let (allowed, _, remaining, reset_time) = decode_verdict(value)?;

        Ok(RateLimitInfo {
            allowed: allowed == 1,
            limit: cfg.capacity,
            remaining,
            reset_time,
        })
    }
}
