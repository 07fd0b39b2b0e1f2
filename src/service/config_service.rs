//! Holds the active policy snapshot and publishes updates atomically.

use crate::error::LimitResult;
use crate::provider::{ChangeCallback, ConfigProvider, ErrorCallback};
use crate::snapshot::PolicySnapshot;
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Atomically published policy snapshot plus its watch supervisor.
///
/// Readers load the current snapshot wait-free; only the watch task (and
/// `load_once`) writes. A reader that starts after a publish completes
/// observes that snapshot or a later one, never an earlier one.
pub struct ConfigService {
    provider: Arc<dyn ConfigProvider>,
    snapshot: ArcSwap<PolicySnapshot>,
    poll_interval: Duration,
}

impl std::fmt::Debug for ConfigService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigService")
            .field("routes", &self.snapshot().routes.len())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl ConfigService {
    /// Create the service with an empty initial snapshot.
    #[must_use]
    pub fn new(provider: Arc<dyn ConfigProvider>, poll_interval: Duration) -> Self {
        Self {
            provider,
            snapshot: ArcSwap::from_pointee(PolicySnapshot::default()),
            poll_interval,
        }
    }

    /// Synchronous initial fetch. Failure here is a startup error.
    pub async fn load_once(&self, key: &str) -> LimitResult<()> {
        let snapshot = self.provider.get(key).await?;
        info!(key, routes = snapshot.routes.len(), "initial policy snapshot loaded");
        self.publish(snapshot);
        Ok(())
    }

    /// Atomically replace the current snapshot.
    pub fn publish(&self, snapshot: PolicySnapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }

    /// Current snapshot; wait-free for readers.
    #[must_use]
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.snapshot.load_full()
    }

    /// Launch the watch as an independent task.
    ///
    /// Update callbacks replace the snapshot; error callbacks are logged and
    /// the watch continues. The task exits when `cancel` fires; the returned
    /// handle lets shutdown wait for that.
    pub fn start_watch(self: &Arc<Self>, key: &str, cancel: CancellationToken) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let key = key.to_string();

        tokio::spawn(async move {
            let on_change: ChangeCallback = {
                let service = Arc::clone(&service);
                Box::new(move |snapshot: PolicySnapshot| {
                    info!(routes = snapshot.routes.len(), "policy snapshot updated");
                    service.publish(snapshot);
                })
            };
            let on_error: ErrorCallback = Box::new(|error| {
                warn!(code = error.code(), %error, "policy watch error, snapshot unchanged");
            });

            service
                .provider
                .watch(&key, service.poll_interval, cancel, on_change, on_error)
                .await;
        })
    }
}
