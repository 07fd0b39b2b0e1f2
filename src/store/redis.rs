//! Redis score store adapter.
//!
//! Shares one multiplexed async connection across all callers. Evaluation
//! prefers `EVALSHA` with the script digest and falls back to `EVAL` with
//! the full text on a NOSCRIPT response; digests can be pre-loaded at
//! startup with `SCRIPT LOAD`. Every operation is bounded by the configured
//! operation timeout.

use super::{ScoreStore, ScriptArg, ScriptHandle};
use crate::error::{LimitError, LimitResult};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, ErrorKind, RedisResult, Value};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Score store backed by a Redis-compatible server.
#[derive(Clone)]
pub struct RedisScoreStore {
    conn: MultiplexedConnection,
    op_timeout: Duration,
}

impl std::fmt::Debug for RedisScoreStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisScoreStore")
            .field("op_timeout", &self.op_timeout)
            .finish()
    }
}

impl RedisScoreStore {
    /// Connect to the server at `url` (`redis://...`).
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
        op_timeout: Duration,
    ) -> LimitResult<Self> {
        let client = Client::open(url)
            .map_err(|e| LimitError::Store(format!("invalid redis url: {e}")))?;

        let conn = match tokio::time::timeout(
            connect_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(LimitError::Store(format!("connect to redis: {e}"))),
            Err(_) => {
                return Err(LimitError::Store(format!(
                    "connect to redis timed out after {connect_timeout:?}"
                )))
            },
        };

        Ok(Self { conn, op_timeout })
    }

    /// Push a script to the server so later evaluations hit the digest path.
    ///
    /// Latency optimization only: evaluation falls back to the full text on
    /// a digest miss regardless.
    pub async fn preload(&self, script: &ScriptHandle) -> LimitResult<()> {
        let mut conn = self.conn.clone();
        let text = script.text().to_string();
        let loaded: String = self
            .bounded(async move {
                redis::cmd("SCRIPT")
                    .arg("LOAD")
                    .arg(text)
                    .query_async(&mut conn)
                    .await
            })
            .await?;

        if !loaded.eq_ignore_ascii_case(script.digest()) {
            warn!(
                script = script.name(),
                local = script.digest(),
                server = %loaded,
                "script digest mismatch after SCRIPT LOAD"
            );
        } else {
            debug!(script = script.name(), digest = script.digest(), "script preloaded");
        }
        Ok(())
    }

    /// Bound a store operation by the operation timeout.
    async fn bounded<T>(&self, fut: impl Future<Output = RedisResult<T>>) -> LimitResult<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(LimitError::Store(e.to_string())),
            Err(_) => Err(LimitError::Store(format!(
                "operation timed out after {:?}",
                self.op_timeout
            ))),
        }
    }
}

#[async_trait]
impl ScoreStore for RedisScoreStore {
    async fn eval(
        &self,
        script: &ScriptHandle,
        keys: &[&str],
        args: &[ScriptArg],
    ) -> LimitResult<Value> {
        let mut conn = self.conn.clone();

        let mut sha_cmd = redis::cmd("EVALSHA");
        sha_cmd.arg(script.digest()).arg(keys.len());
        for key in keys {
            sha_cmd.arg(*key);
        }
        for arg in args {
            sha_cmd.arg(arg);
        }

        let attempt = tokio::time::timeout(self.op_timeout, async {
            let value: Value = sha_cmd.query_async(&mut conn).await?;
            Ok::<_, redis::RedisError>(value)
        })
        .await;

        match attempt {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) if e.kind() == ErrorKind::NoScriptError => {
                debug!(script = script.name(), "digest miss, sending full script text");
                let mut cmd = redis::cmd("EVAL");
                cmd.arg(script.text()).arg(keys.len());
                for key in keys {
                    cmd.arg(*key);
                }
                for arg in args {
                    cmd.arg(arg);
                }
                let mut conn = self.conn.clone();
                self.bounded(async move {
                    let value: Value = cmd.query_async(&mut conn).await?;
                    Ok(value)
                })
                .await
            },
            Ok(Err(e)) => Err(LimitError::Store(e.to_string())),
            Err(_) => Err(LimitError::Store(format!(
                "operation timed out after {:?}",
                self.op_timeout
            ))),
        }
    }

    async fn get(&self, key: &str) -> LimitResult<Option<String>> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        self.bounded(async move { redis::cmd("GET").arg(key).query_async(&mut conn).await })
            .await
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> LimitResult<()> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        let value = value.to_string();
        self.bounded(async move {
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(ttl_seconds)
                .query_async(&mut conn)
                .await
        })
        .await
    }

    async fn incr(&self, key: &str) -> LimitResult<i64> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        self.bounded(async move { redis::cmd("INCR").arg(key).query_async(&mut conn).await })
            .await
    }

    async fn ping(&self) -> LimitResult<()> {
        let mut conn = self.conn.clone();
        let _: String = self
            .bounded(async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        Ok(())
    }
}
