//! Configuration provider: the source of policy snapshots.

pub mod consul;

pub use consul::ConsulKv;

use crate::error::{LimitError, LimitResult};
use crate::snapshot::PolicySnapshot;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Invoked with each newly observed snapshot.
pub type ChangeCallback = Box<dyn Fn(PolicySnapshot) + Send + Sync>;

/// Invoked on each transient watch failure.
pub type ErrorCallback = Box<dyn Fn(LimitError) + Send + Sync>;

/// Source of policy snapshots stored under a K/V key.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// One-shot fetch. A missing key yields the empty snapshot, not an error.
    async fn get(&self, key: &str) -> LimitResult<PolicySnapshot>;

    /// Watch `key` until `cancel` fires.
    ///
    /// `on_change` runs after every observed update; `on_error` on each
    /// transient failure, after which the watch sleeps `poll_interval`
    /// before the next attempt.
    async fn watch(
        &self,
        key: &str,
        poll_interval: Duration,
        cancel: CancellationToken,
        on_change: ChangeCallback,
        on_error: ErrorCallback,
    );
}
