//! Failure gating for the score store.

mod circuit_breaker;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
