//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to an external dependency:
//!     → circuit_breaker.rs (fail fast while the dependency is down)
//!     → timeouts.rs (enforce a deadline on the call)
//!     → On failure: retries.rs (retry with backoff.rs delays if retryable)
//!     → circuit_breaker.rs (record the outcome, open on threshold)
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline
//! - Retries stop as soon as the breaker rejects
//! - Breaker state is never persisted; a restart starts closed

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerError, BreakerRegistry, CircuitBreaker, CircuitState};
pub use retries::RetryPolicy;
