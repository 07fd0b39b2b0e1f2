//! Consul KV adapter for the config provider.
//!
//! Uses the HTTP KV API with blocking queries: a watch request carries the
//! last seen `ModifyIndex` and a `wait` duration, so the call suspends
//! server-side until the key changes or the wait elapses.

use super::{ChangeCallback, ConfigProvider, ErrorCallback};
use crate::error::{LimitError, LimitResult};
use crate::snapshot::PolicySnapshot;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One entry of a KV read response.
#[derive(Debug, Deserialize)]
struct KvEntry {
    #[serde(rename = "Value")]
    value: Option<String>,
    #[serde(rename = "ModifyIndex")]
    modify_index: u64,
}

/// Result of one KV fetch: the decoded snapshot (when the key exists) and
/// the modify index to resume the blocking query from.
#[derive(Debug)]
struct KvRead {
    snapshot: Option<PolicySnapshot>,
    index: u64,
}

/// Config provider backed by the Consul KV HTTP API.
#[derive(Debug, Clone)]
pub struct ConsulKv {
    http: reqwest::Client,
    base_url: String,
}

impl ConsulKv {
    /// Create an adapter for the agent at `addr` (e.g. `http://127.0.0.1:8500`).
    pub fn new(addr: &str) -> LimitResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| LimitError::Provider(format!("build http client: {e}")))?;
        Ok(Self {
            http,
            base_url: addr.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch `key`, optionally as a blocking query resuming from `index`.
    async fn fetch(&self, key: &str, blocking: Option<(u64, Duration)>) -> LimitResult<KvRead> {
        let url = format!("{}/v1/kv/{key}", self.base_url);
        let mut request = self.http.get(&url);

        if let Some((index, wait)) = blocking {
            request = request
                .query(&[
                    ("index", index.to_string()),
                    ("wait", format!("{}s", wait.as_secs().max(1))),
                ])
                // Consul may stretch the wait by up to wait/16.
                .timeout(wait + wait / 8 + Duration::from_secs(2));
        }

        let response = request
            .send()
            .await
            .map_err(|e| LimitError::Provider(format!("kv request for '{key}': {e}")))?;

        let header_index = response
            .headers()
            .get("X-Consul-Index")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(KvRead {
                snapshot: None,
                index: header_index.unwrap_or(0),
            });
        }

        if !response.status().is_success() {
            return Err(LimitError::Provider(format!(
                "kv request for '{key}' returned {}",
                response.status()
            )));
        }

        let entries: Vec<KvEntry> = response
            .json()
            .await
            .map_err(|e| LimitError::Provider(format!("decode kv response for '{key}': {e}")))?;

        match entries.first() {
            Some(entry) => {
                let snapshot = entry
                    .value
                    .as_deref()
                    .map(|encoded| decode_policy_value(key, encoded))
                    .transpose()?
                    .unwrap_or_default();
                Ok(KvRead {
                    snapshot: Some(snapshot),
                    index: header_index.unwrap_or(entry.modify_index),
                })
            },
            None => Ok(KvRead {
                snapshot: None,
                index: header_index.unwrap_or(0),
            }),
        }
    }
}

/// Decode one base64 KV value into a snapshot.
fn decode_policy_value(key: &str, encoded: &str) -> LimitResult<PolicySnapshot> {
    let raw = BASE64
        .decode(encoded)
        .map_err(|e| LimitError::Provider(format!("decode kv value for '{key}': {e}")))?;
    PolicySnapshot::from_json(&raw)
        .map_err(|e| LimitError::Provider(format!("parse policy document for '{key}': {e}")))
}

#[async_trait]
impl ConfigProvider for ConsulKv {
    async fn get(&self, key: &str) -> LimitResult<PolicySnapshot> {
        let read = self.fetch(key, None).await?;
        match read.snapshot {
            Some(snapshot) => Ok(snapshot),
            None => {
                info!(key, "policy key absent, starting with empty snapshot");
                Ok(PolicySnapshot::default())
            },
        }
    }

    async fn watch(
        &self,
        key: &str,
        poll_interval: Duration,
        cancel: CancellationToken,
        on_change: ChangeCallback,
        on_error: ErrorCallback,
    ) {
        let mut last_index = 0u64;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let fetch = self.fetch(key, Some((last_index, poll_interval)));
            let read = tokio::select! {
                _ = cancel.cancelled() => break,
                read = fetch => read,
            };

            match read {
                Ok(read) => {
                    let changed = read.index != last_index;
                    last_index = read.index;
                    match read.snapshot {
                        Some(snapshot) if changed => {
                            debug!(key, index = read.index, "policy key updated");
                            on_change(snapshot);
                        },
                        Some(_) => {},
                        None => debug!(key, "policy key absent"),
                    }
                },
                Err(e) => {
                    warn!(key, error = %e, "kv watch attempt failed");
                    on_error(e);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(poll_interval) => {},
                    }
                },
            }
        }

        info!(key, "kv watch stopped");
    }
}
