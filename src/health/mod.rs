//! Resource health subsystem.
//!
//! # Data Flow
//! ```text
//! validate_resource(url)
//!     → resource.rs (fresh cached status? answer from cache)
//!     → resource.rs (retry cap reached? give up)
//!     → probe.rs (HEAD request with deadline)
//!     → resource.rs (record ResourceStatus, update retry counter)
//! ```
//!
//! # Design Decisions
//! - Results stay fresh for a fixed window to avoid redundant checks
//! - Failures are recorded, never returned as errors
//! - Any response counts as reachable unless status checking is enabled

pub mod probe;
pub mod resource;

pub use probe::{HttpProbe, ProbeError, ResourceProbe};
pub use resource::{ResourceStatus, ResourceValidator};
