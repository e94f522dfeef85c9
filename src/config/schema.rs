//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observability::system_log::LogLevel;

/// Root configuration for the resilience service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Admin API settings (bind address, auth).
    pub admin: AdminConfig,

    /// Defaults for every circuit breaker created by the registry.
    pub breaker: BreakerConfig,

    /// Resource reachability checks.
    pub resources: ResourceConfig,

    /// Query performance monitoring.
    pub queries: QueryMonitorConfig,

    /// In-process log store and tracing output.
    pub logging: LoggingConfig,

    /// Route prediction and its persistence.
    pub navigation: NavigationConfig,

    /// Automatic recovery after repeated errors.
    pub recovery: RecoveryConfig,

    /// Cached random numbers.
    pub entropy: EntropyConfig,

    /// Metrics exporter settings.
    pub observability: ObservabilityConfig,
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,

    /// How long the circuit stays open before a probe is allowed, in milliseconds.
    pub reset_timeout_ms: u64,
}

impl BreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
        }
    }
}

/// Resource validator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// How long a check result stays fresh, in seconds.
    pub freshness_secs: u64,

    /// Failed attempts per URL before the validator gives up.
    pub max_retries: u32,

    /// Timeout for a single HEAD probe in milliseconds.
    pub probe_timeout_ms: u64,

    /// Treat only 2xx/3xx responses as reachable.
    /// Off by default: any response counts, like an opaque cross-origin reply.
    pub require_success_status: bool,
}

impl ResourceConfig {
    pub fn freshness(&self) -> Duration {
        Duration::from_secs(self.freshness_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            freshness_secs: 300,
            max_retries: 3,
            probe_timeout_ms: 5_000,
            require_success_status: false,
        }
    }
}

/// Query performance monitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueryMonitorConfig {
    /// Maximum number of retained metrics.
    pub capacity: usize,

    /// Queries slower than this are flagged, in milliseconds.
    pub slow_threshold_ms: u64,

    /// Number of most recent metrics included in stats.
    pub recent_window: usize,
}

impl Default for QueryMonitorConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            slow_threshold_ms: 1000,
            recent_window: 50,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level kept by the in-process log store.
    pub min_level: LogLevel,

    /// Production mode: only error and critical entries are mirrored to tracing.
    pub production: bool,

    /// Maximum number of retained log entries.
    pub capacity: usize,

    /// Route panics into the log store.
    pub capture_panics: bool,

    /// Default tracing filter when `RUST_LOG` is unset.
    pub filter: String,

    /// Emit tracing output as JSON lines.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Debug,
            production: false,
            capacity: 1000,
            capture_panics: true,
            filter: "paes_resilience=debug,tower_http=debug".to_string(),
            json: false,
        }
    }
}

/// Navigation predictor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Directory of the JSON key-value store.
    pub store_dir: PathBuf,

    /// Key the transition table is stored under.
    pub storage_key: String,

    /// Outgoing edges kept per source route.
    pub max_edges_per_route: usize,

    /// Edges older than this are ignored by predictions, in days.
    pub window_days: u64,

    /// Number of predicted destinations.
    pub max_predictions: usize,

    /// Delay persistence by this many milliseconds (0 = write on every update).
    pub persist_debounce_ms: u64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(".paes-state"),
            storage_key: "navigation_patterns_v2".to_string(),
            max_edges_per_route: 5,
            window_days: 7,
            max_predictions: 3,
            persist_debounce_ms: 0,
        }
    }
}

/// Auto recovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Enable auto recovery.
    pub enabled: bool,

    /// Errors within the window that trigger recovery.
    pub error_threshold: u32,

    /// Counting window in seconds.
    pub window_secs: u64,

    /// Minimum time between two recoveries in seconds.
    pub cooldown_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            error_threshold: 3,
            window_secs: 60,
            cooldown_secs: 30,
        }
    }
}

/// Random number cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EntropyConfig {
    /// Numbers generated per refill.
    pub batch_size: usize,

    /// Lifetime of a batch in seconds.
    pub ttl_secs: u64,
}

impl Default for EntropyConfig {
    fn default() -> Self {
        Self {
            batch_size: 256,
            ttl_secs: 300,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
