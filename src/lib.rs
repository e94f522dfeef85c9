//! Resilience and observability utilities for the PAES platform.
//!
//! - [`resilience`]: circuit breakers, retries, timeouts
//! - [`health`]: cached resource reachability checks
//! - [`observability`]: in-process log store, query monitor, metrics, tracing
//! - [`navigation`]: next-route prediction with persisted patterns
//! - [`entropy`]: cached random numbers with fallback
//! - [`lifecycle`]: init state, debouncing, auto recovery, shutdown
//! - [`admin`]: HTTP API over a [`ResilienceContext`]

// Core utilities
pub mod health;
pub mod navigation;
pub mod observability;
pub mod resilience;

// Cross-cutting concerns
pub mod config;
pub mod entropy;
pub mod lifecycle;
pub mod time;

// Service surface
pub mod admin;
pub mod context;

pub use config::schema::ServiceConfig;
pub use context::ResilienceContext;
pub use lifecycle::Shutdown;
