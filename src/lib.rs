//! # limitgate
//!
//! A network-edge rate-limiting gateway. It fronts a backend origin,
//! consults a per-route rate-limit policy keyed by client IP, and either
//! reverse proxies the request or rejects it with 429.
//!
//! ## Architecture
//!
//! - Policies are served from a Consul K/V key as a JSON document, watched
//!   with blocking queries and published atomically as an immutable
//!   [`snapshot::PolicySnapshot`].
//! - Counters and token state live in a shared Redis-compatible score
//!   store; all three algorithms (fixed window, sliding window, token
//!   bucket) run as atomic server-side scripts, so any number of gateway
//!   instances share one coherent view.
//! - A circuit breaker bounds degradation when the score store is
//!   unavailable: requests fail closed unless the source IP is
//!   whitelisted.
//!
//! ## Decision flow
//!
//! Inbound request → [`service::LimiterService::decide`] → whitelist
//! short-circuit → snapshot route lookup → [`limiter::Limiter::allow`] →
//! [`store::ScoreStore::eval`] → script verdict →
//! [`limiter::RateLimitInfo`].

pub mod config;
pub mod error;
pub mod http;
pub mod limiter;
pub mod policy;
pub mod provider;
pub mod resilience;
pub mod service;
pub mod snapshot;
pub mod store;
