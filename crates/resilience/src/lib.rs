//! Fault isolation for synchronous downstream calls.
//!
//! [`CircuitBreakerGate`] wraps calls to a dependency and stops calling it for
//! a cool-down period once it keeps failing:
//! - Closed: calls pass through, failures are counted in a sliding window
//! - Open: calls are short-circuited with [`GateError::Open`]
//! - HalfOpen: a bounded number of trial calls decide between Closed and Open

pub mod circuit_breaker;

pub use circuit_breaker::{CircuitBreakerConfig, CircuitBreakerGate, CircuitState, GateError};
