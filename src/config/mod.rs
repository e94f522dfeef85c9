//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → shared via ArcSwap in ResilienceContext
//!
//! On change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → ResilienceContext::apply_config swaps it in
//!     → log level and breaker defaults follow the new values
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::AdminConfig;
pub use schema::BreakerConfig;
pub use schema::EntropyConfig;
pub use schema::LoggingConfig;
pub use schema::NavigationConfig;
pub use schema::ObservabilityConfig;
pub use schema::QueryMonitorConfig;
pub use schema::RecoveryConfig;
pub use schema::ResourceConfig;
pub use schema::ServiceConfig;
