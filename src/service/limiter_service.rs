//! Top-level rate-limit decision service.

use super::ConfigService;
use crate::error::{LimitError, LimitResult};
use crate::limiter::{Limiter, RateLimitInfo};
use crate::policy::Policy;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Composes whitelist policy, active snapshot and limiter instances into
/// the per-request decision.
pub struct LimiterService {
    config: Arc<ConfigService>,
    limiters: HashMap<String, Arc<dyn Limiter>>,
    policy: Policy,
}

impl std::fmt::Debug for LimiterService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimiterService")
            .field("algorithms", &self.limiters.keys().collect::<Vec<_>>())
            .field("whitelisted_ips", &self.policy.len())
            .finish()
    }
}

impl LimiterService {
    /// Create the service.
    #[must_use]
    pub fn new(
        config: Arc<ConfigService>,
        limiters: HashMap<String, Arc<dyn Limiter>>,
        policy: Policy,
    ) -> Self {
        Self {
            config,
            limiters,
            policy,
        }
    }

    /// Decide whether the request from `ip` on `route` may proceed.
    ///
    /// Whitelisted IPs and routes absent from the snapshot return the
    /// bypass sentinel; unknown routes are deliberately unlimited so the
    /// gateway does not block traffic during policy rollout.
    pub async fn decide(&self, ip: &str, route: &str) -> LimitResult<RateLimitInfo> {
        if self.policy.should_bypass(ip) {
            debug!(ip, route, "ip whitelisted, bypassing rate limit");
            return Ok(RateLimitInfo::bypass());
        }

        let snapshot = self.config.snapshot();
        let Some(route_config) = snapshot.routes.get(route) else {
            debug!(ip, route, "route not in snapshot, no limit applied");
            return Ok(RateLimitInfo::bypass());
        };

        let limiter = self.limiters.get(&route_config.algorithm).ok_or_else(|| {
            error!(
                route,
                algorithm = %route_config.algorithm,
                "no limiter registered for algorithm"
            );
            LimitError::UnknownAlgorithm(route_config.algorithm.clone())
        })?;

        let cfg = route_config.validated_config().map_err(|reason| {
            error!(route, algorithm = %route_config.algorithm, %reason, "invalid route config");
            LimitError::InvalidConfig(reason)
        })?;

        let key = storage_key(&route_config.algorithm, route, ip);
        debug!(%key, ip, route, algorithm = %route_config.algorithm, "checking rate limit");

        limiter.allow(&key, cfg).await
    }
}

/// Composite storage key for one `(algorithm, route, ip)` triple.
///
/// The `rl:` prefix is reserved; external systems must not write under it.
fn storage_key(algorithm: &str, route: &str, ip: &str) -> String {
    format!("rl:{algorithm}:{route}:{ip}")
}
