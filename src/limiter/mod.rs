//! Rate-limit algorithms.
//!
//! Each limiter binds one algorithm's typed configuration to its script:
//! it computes the runtime arguments, delegates to the score store's atomic
//! evaluation, and decodes the script's 4-tuple verdict into a
//! [`RateLimitInfo`]. Limiters are stateless apart from their script handle
//! and store reference and are safe for concurrent use.

mod fixed_window;
mod registry;
mod sliding_window;
mod token_bucket;

pub use fixed_window::FixedWindowLimiter;
pub use registry::{LimiterFactory, LimiterRegistry};
pub use sliding_window::SlidingWindowLimiter;
pub use token_bucket::TokenBucketLimiter;

use crate::error::{LimitError, LimitResult};
use crate::snapshot::AlgorithmConfig;
use async_trait::async_trait;
use redis::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Outcome of a rate-limit decision, shaped for response-header emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Configured limit for the matched policy.
    pub limit: i64,
    /// Requests remaining in the current window or bucket.
    pub remaining: i64,
    /// Seconds since epoch at which the limit resets; 0 when unknown.
    pub reset_time: i64,
}

impl RateLimitInfo {
    /// Sentinel for "not subject to limiting" (whitelisted or unknown route).
    #[must_use]
    pub fn bypass() -> Self {
        Self {
            allowed: true,
            limit: -1,
            remaining: -1,
            reset_time: 0,
        }
    }
}

/// One rate-limit algorithm bound to its script.
#[async_trait]
pub trait Limiter: Send + Sync {
    /// Decide whether the request under `key` may proceed per `cfg`.
    ///
    /// `cfg` must be the variant this limiter implements; a mismatch is an
    /// `INVALID_CONFIG` error.
    async fn allow(&self, key: &str, cfg: &AlgorithmConfig) -> LimitResult<RateLimitInfo>;
}

/// Decode the `[allowed, limit, remaining, reset_or_ttl]` script reply.
fn decode_verdict(value: Value) -> LimitResult<(i64, i64, i64, i64)> {
    let items = match value {
        Value::Array(items) if items.len() >= 4 => items,
        other => {
            return Err(LimitError::Store(format!(
                "unexpected script response: {other:?}"
            )))
        },
    };

    let mut fields = [0i64; 4];
    for (slot, item) in fields.iter_mut().zip(&items) {
        *slot = match item {
            Value::Int(n) => *n,
            other => {
                return Err(LimitError::Store(format!(
                    "non-integer field in script response: {other:?}"
                )))
            },
        };
    }
    Ok((fields[0], fields[1], fields[2], fields[3]))
}

/// Current wall-clock time as seconds since epoch.
fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Current wall-clock time as milliseconds since epoch.
fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
