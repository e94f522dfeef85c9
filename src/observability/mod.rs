//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (tracing subscriber: structured events to stdout)
//!     → metrics.rs (counters, gauges, histograms)
//!     → system_log.rs (bounded in-process log store, admin API)
//!     → query_monitor.rs (latency/outcome of wrapped async calls)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Admin API (/admin/logs, /admin/queries)
//! ```
//!
//! # Design Decisions
//! - Structured fields on every tracing event
//! - Stores are bounded (ring.rs); nothing grows without limit
//! - Metrics are cheap no-ops when no exporter is installed

pub mod logging;
pub mod metrics;
pub mod query_monitor;
pub mod ring;
pub mod system_log;
