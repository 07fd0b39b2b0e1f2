//! Configuration types for the gateway process.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Score store settings.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Configuration K/V store settings.
    #[serde(default)]
    pub consul: ConsulConfig,

    /// Gateway application settings.
    #[serde(default)]
    pub app: AppConfig,
}

impl GatewayConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.redis.validate()?;
        self.consul.validate()?;
        self.app.validate()?;
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_address")]
    pub address: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// How long shutdown waits for in-flight requests to drain.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

impl ServerConfig {
    /// The `address:port` pair to bind.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Shutdown drain timeout.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.address.is_empty() {
            return Err("server.address cannot be empty".to_string());
        }
        if self.port == 0 {
            return Err("server.port must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Score store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL.
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Initial connection timeout.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,

    /// Per-operation timeout.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_seconds: u64,

    /// Consecutive failures before the circuit breaker opens.
    #[serde(default = "default_max_failures")]
    pub circuit_breaker_max_failures: u32,

    /// How long the breaker stays open before probing.
    #[serde(default = "default_breaker_timeout")]
    pub circuit_breaker_timeout_seconds: u64,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_operation_timeout() -> u64 {
    2
}

fn default_max_failures() -> u32 {
    5
}

fn default_breaker_timeout() -> u64 {
    30
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            connection_timeout_seconds: default_connection_timeout(),
            operation_timeout_seconds: default_operation_timeout(),
            circuit_breaker_max_failures: default_max_failures(),
            circuit_breaker_timeout_seconds: default_breaker_timeout(),
        }
    }
}

impl RedisConfig {
    /// Initial connection timeout.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_seconds)
    }

    /// Per-operation timeout.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_seconds)
    }

    /// Breaker recovery timeout.
    #[must_use]
    pub fn circuit_breaker_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_timeout_seconds)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), String> {
        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err("redis.url must start with redis:// or rediss://".to_string());
        }
        if self.operation_timeout_seconds == 0 {
            return Err("redis.operation_timeout_seconds must be greater than 0".to_string());
        }
        if self.circuit_breaker_max_failures == 0 {
            return Err("redis.circuit_breaker_max_failures must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Configuration K/V store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsulConfig {
    /// Agent HTTP address.
    #[serde(default = "default_consul_addr")]
    pub addr: String,
}

fn default_consul_addr() -> String {
    "http://127.0.0.1:8500".to_string()
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            addr: default_consul_addr(),
        }
    }
}

impl ConsulConfig {
    /// Validate the settings.
    pub fn validate(&self) -> Result<(), String> {
        if !self.addr.starts_with("http://") && !self.addr.starts_with("https://") {
            return Err("consul.addr must start with http:// or https://".to_string());
        }
        Ok(())
    }
}

/// Gateway application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// K/V key holding the policy document.
    #[serde(default = "default_config_key")]
    pub config_key: String,

    /// Poll interval for the policy watch.
    #[serde(default = "default_fetch_period")]
    pub fetch_config_period_seconds: u64,

    /// Backend origin requests are forwarded to.
    #[serde(default = "default_backend_addr")]
    pub backend_addr: String,

    /// Client IPs that bypass rate limiting.
    #[serde(default)]
    pub whitelisted_ips: Vec<String>,

    /// Directory holding the `{algorithm}.lua` script files.
    #[serde(default = "default_script_dir")]
    pub script_dir: PathBuf,
}

fn default_config_key() -> String {
    "limitgate/routes".to_string()
}

fn default_fetch_period() -> u64 {
    10
}

fn default_backend_addr() -> String {
    "http://127.0.0.1:8081".to_string()
}

fn default_script_dir() -> PathBuf {
    PathBuf::from("scripts/lua")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_key: default_config_key(),
            fetch_config_period_seconds: default_fetch_period(),
            backend_addr: default_backend_addr(),
            whitelisted_ips: Vec::new(),
            script_dir: default_script_dir(),
        }
    }
}

impl AppConfig {
    /// Policy watch poll interval.
    #[must_use]
    pub fn fetch_config_period(&self) -> Duration {
        Duration::from_secs(self.fetch_config_period_seconds)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.config_key.is_empty() {
            return Err("app.config_key cannot be empty".to_string());
        }
        if self.fetch_config_period_seconds == 0 {
            return Err("app.fetch_config_period_seconds must be greater than 0".to_string());
        }
        if !self.backend_addr.starts_with("http://") && !self.backend_addr.starts_with("https://")
        {
            return Err("app.backend_addr must start with http:// or https://".to_string());
        }
        Ok(())
    }
}
