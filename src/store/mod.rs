//! Score store: shared remote state for rate-limit counters.
//!
//! The [`ScoreStore`] trait is the seam between the limiters and the
//! Redis-compatible server that executes the atomic decision scripts.
//! [`self::redis::RedisScoreStore`] is the wire implementation;
//! [`resilient::ResilientScoreStore`] decorates any store with a circuit
//! breaker.

pub mod redis;
pub mod resilient;
mod script;

pub use self::redis::RedisScoreStore;
pub use resilient::ResilientScoreStore;
pub use script::{ScriptError, ScriptHandle};

use crate::error::LimitResult;
use async_trait::async_trait;
// `::redis` is the client crate; the sibling module `redis` holds our adapter.
use ::redis::{RedisWrite, ToRedisArgs, Value};

/// One positional argument to a script evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptArg {
    /// Integer argument.
    Int(i64),
    /// String argument.
    Str(String),
}

impl From<i64> for ScriptArg {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for ScriptArg {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ScriptArg {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl ToRedisArgs for ScriptArg {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        match self {
            Self::Int(n) => n.write_redis_args(out),
            Self::Str(s) => s.write_redis_args(out),
        }
    }
}

/// Atomic script evaluation against shared remote state.
///
/// Every operation is bounded by the implementation's operation timeout; a
/// timed-out operation is an error to the caller, with no implicit retry.
/// Implementations must be safe for concurrent use.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Evaluate `script` atomically with the given keys and arguments.
    ///
    /// The return value follows the script's own convention; the rate-limit
    /// scripts return a 4-element array of integers.
    async fn eval(&self, script: &ScriptHandle, keys: &[&str], args: &[ScriptArg])
        -> LimitResult<Value>;

    /// Read a key. Diagnostics only; not on the decision path.
    async fn get(&self, key: &str) -> LimitResult<Option<String>>;

    /// Write a key with a TTL. Diagnostics only.
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> LimitResult<()>;

    /// Increment a counter. Diagnostics only.
    async fn incr(&self, key: &str) -> LimitResult<i64>;

    /// Liveness probe.
    async fn ping(&self) -> LimitResult<()>;
}
