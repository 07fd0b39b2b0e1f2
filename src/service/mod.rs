//! Application services composing the domain pieces.

mod config_service;
mod limiter_service;

pub use config_service::ConfigService;
pub use limiter_service::LimiterService;
