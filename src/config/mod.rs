//! # Application Configuration
//!
//! TOML-based configuration for the gateway process itself (as opposed to
//! the rate-limit policy document, which lives in the K/V store and is
//! handled by [`crate::snapshot`]).
//!
//! ## Example Configuration
//!
//! ```toml
//! [server]
//! address = "0.0.0.0"
//! port = 8080
//!
//! [redis]
//! url = "redis://127.0.0.1:6379"
//! operation_timeout_seconds = 2
//!
//! [consul]
//! addr = "http://127.0.0.1:8500"
//!
//! [app]
//! config_key = "limitgate/routes"
//! backend_addr = "http://127.0.0.1:8081"
//! whitelisted_ips = ["127.0.0.1"]
//! ```

mod error;
mod loader;
mod types;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use types::{AppConfig, ConsulConfig, GatewayConfig, RedisConfig, ServerConfig};
