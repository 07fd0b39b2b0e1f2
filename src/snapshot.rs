//! Policy snapshot: the per-route rate-limit configuration document.
//!
//! A snapshot is an immutable mapping from route key to [`RouteConfig`].
//! It is parsed from the JSON document stored in the configuration K/V
//! store and replaced atomically on every observed update; an empty map is
//! the valid initial state.

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

/// Algorithm name for the fixed-window counter.
pub const FIXED_WINDOW: &str = "fixed_window";
/// Algorithm name for the token bucket.
pub const TOKEN_BUCKET: &str = "token_bucket";
/// Algorithm name for the sliding-window log.
pub const SLIDING_WINDOW: &str = "sliding_window";

/// Upper bound for windows and TTLs, in seconds (24 hours).
const MAX_WINDOW_SECONDS: i64 = 86_400;

/// Immutable mapping from route key to route configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    /// Per-route policies.
    #[serde(default)]
    pub routes: HashMap<String, RouteConfig>,
}

impl PolicySnapshot {
    /// Parse a snapshot from the JSON policy document.
    pub fn from_json(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

/// Rate-limit policy for a single route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteConfig {
    /// Algorithm name selecting the limiter variant.
    pub algorithm: String,

    /// Algorithm-specific configuration. `None` when the document named an
    /// algorithm this gateway does not know; rejected at decision time.
    pub config: Option<AlgorithmConfig>,
}

impl RouteConfig {
    /// Validate and return the algorithm configuration.
    ///
    /// Fails when the algorithm was unknown at parse time, when the config
    /// variant does not match the algorithm name, or when the variant's own
    /// bounds checks fail.
    pub fn validated_config(&self) -> Result<&AlgorithmConfig, String> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| format!("unknown algorithm '{}'", self.algorithm))?;

        if config.algorithm_name() != self.algorithm {
            return Err(format!(
                "algorithm mismatch: route says '{}', config is '{}'",
                self.algorithm,
                config.algorithm_name()
            ));
        }

        config.validate()?;
        Ok(config)
    }
}

// The document stores each route as a flat object tagged by "algorithm":
// {"algorithm": "fixed_window", "limit": 100, "window": 60}. An unknown
// algorithm name parses to a config-less route, not a snapshot-wide error.
impl<'de> Deserialize<'de> for RouteConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let algorithm = value
            .get("algorithm")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| D::Error::missing_field("algorithm"))?
            .to_string();

        let config = match algorithm.as_str() {
            FIXED_WINDOW => Some(AlgorithmConfig::FixedWindow(
                serde_json::from_value(value).map_err(D::Error::custom)?,
            )),
            TOKEN_BUCKET => Some(AlgorithmConfig::TokenBucket(
                serde_json::from_value(value).map_err(D::Error::custom)?,
            )),
            SLIDING_WINDOW => Some(AlgorithmConfig::SlidingWindow(
                serde_json::from_value(value).map_err(D::Error::custom)?,
            )),
            _ => None,
        };

        Ok(Self { algorithm, config })
    }
}

impl Serialize for RouteConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("algorithm", &self.algorithm)?;
        match &self.config {
            Some(AlgorithmConfig::FixedWindow(c)) => {
                map.serialize_entry("limit", &c.limit)?;
                map.serialize_entry("window", &c.window)?;
            },
            Some(AlgorithmConfig::TokenBucket(c)) => {
                map.serialize_entry("capacity", &c.capacity)?;
                map.serialize_entry("refill_rate", &c.refill_rate)?;
                map.serialize_entry("bucket_ttl", &c.bucket_ttl)?;
            },
            Some(AlgorithmConfig::SlidingWindow(c)) => {
                map.serialize_entry("limit", &c.limit)?;
                map.serialize_entry("window", &c.window)?;
            },
            None => {},
        }
        map.end()
    }
}

/// Algorithm-specific configuration, one variant per limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlgorithmConfig {
    /// Counter reset on a fixed window anchored at the first hit.
    FixedWindow(FixedWindowConfig),
    /// Refilling token bucket.
    TokenBucket(TokenBucketConfig),
    /// Timestamp log over a sliding window.
    SlidingWindow(SlidingWindowConfig),
}

impl AlgorithmConfig {
    /// Name of the algorithm this configuration belongs to.
    #[must_use]
    pub fn algorithm_name(&self) -> &'static str {
        match self {
            Self::FixedWindow(_) => FIXED_WINDOW,
            Self::TokenBucket(_) => TOKEN_BUCKET,
            Self::SlidingWindow(_) => SLIDING_WINDOW,
        }
    }

    /// Validate the variant's bounds.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::FixedWindow(c) => c.validate(),
            Self::TokenBucket(c) => c.validate(),
            Self::SlidingWindow(c) => c.validate(),
        }
    }
}

/// Configuration for the fixed-window algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedWindowConfig {
    /// Maximum requests per window.
    pub limit: i64,
    /// Window length in seconds.
    pub window: i64,
}

impl FixedWindowConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.limit <= 0 {
            return Err(format!("limit must be positive, got {}", self.limit));
        }
        if self.window <= 0 {
            return Err(format!("window must be positive, got {}", self.window));
        }
        if self.window > MAX_WINDOW_SECONDS {
            return Err(format!(
                "window too large: {} seconds (max 24 hours)",
                self.window
            ));
        }
        Ok(())
    }
}

/// Configuration for the token-bucket algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBucketConfig {
    /// Maximum tokens the bucket holds.
    pub capacity: i64,
    /// Tokens added per second.
    pub refill_rate: i64,
    /// TTL of idle bucket state in seconds.
    pub bucket_ttl: i64,
}

impl TokenBucketConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity <= 0 {
            return Err(format!("capacity must be positive, got {}", self.capacity));
        }
        if self.refill_rate <= 0 {
            return Err(format!(
                "refill_rate must be positive, got {}",
                self.refill_rate
            ));
        }
        if self.bucket_ttl <= 0 {
            return Err(format!(
                "bucket_ttl must be positive, got {}",
                self.bucket_ttl
            ));
        }
        if self.bucket_ttl > MAX_WINDOW_SECONDS {
            return Err(format!(
                "bucket_ttl too large: {} seconds (max 24 hours)",
                self.bucket_ttl
            ));
        }
        Ok(())
    }
}

/// Configuration for the sliding-window algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlidingWindowConfig {
    /// Maximum requests per window.
    pub limit: i64,
    /// Window length in seconds.
    pub window: i64,
}

impl SlidingWindowConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.limit <= 0 {
            return Err(format!("limit must be positive, got {}", self.limit));
        }
        if self.window <= 0 {
            return Err(format!("window must be positive, got {}", self.window));
        }
        if self.window > MAX_WINDOW_SECONDS {
            return Err(format!(
                "window too large: {} seconds (max 24 hours)",
                self.window
            ));
        }
        Ok(())
    }
}
