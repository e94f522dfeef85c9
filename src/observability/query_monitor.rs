//! Query latency and success tracking.
//!
//! # Responsibilities
//! - Wrap arbitrary async operations and record duration/outcome
//! - Flag slow queries (warning log + counter)
//! - Aggregate recent metrics for the admin API
//!
//! # Design Decisions
//! - Errors are recorded and handed back untouched; the monitor never
//!   changes the caller's control flow
//! - Durations use tokio's clock so paused-time tests are deterministic
//! - Bounded ring buffer, oldest metric evicted first

use std::fmt::Display;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::QueryMonitorConfig;
use crate::observability::metrics;
use crate::observability::ring::RingBuffer;
use crate::time::epoch_millis;

/// Outcome of a single measured query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryMetric {
    pub query_name: String,
    /// Epoch milliseconds.
    pub start_time: u64,
    /// Epoch milliseconds.
    pub end_time: u64,
    pub duration_ms: u64,
    /// Over the slow threshold, in whole milliseconds.
    pub slow: bool,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
}

/// Aggregate over the retained metrics.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceStats {
    pub total_queries: usize,
    pub average_duration_ms: f64,
    pub slow_queries: usize,
    /// Between 0.0 and 1.0; 0.0 when nothing was measured.
    pub success_rate: f64,
    pub recent: Vec<QueryMetric>,
}

/// Results whose size can be reported as a row count.
pub trait RowCount {
    fn row_count(&self) -> Option<usize>;
}

impl<T> RowCount for Vec<T> {
    fn row_count(&self) -> Option<usize> {
        Some(self.len())
    }
}

impl<T> RowCount for [T] {
    fn row_count(&self) -> Option<usize> {
        Some(self.len())
    }
}

impl<T: RowCount> RowCount for Option<T> {
    fn row_count(&self) -> Option<usize> {
        self.as_ref().and_then(RowCount::row_count)
    }
}

impl RowCount for serde_json::Value {
    fn row_count(&self) -> Option<usize> {
        self.as_array().map(Vec::len)
    }
}

/// Records duration and success of wrapped async operations.
#[derive(Debug)]
pub struct QueryPerformanceMonitor {
    metrics: Mutex<RingBuffer<QueryMetric>>,
    slow_threshold: Duration,
    recent_window: usize,
}

impl QueryPerformanceMonitor {
    pub fn new(config: &QueryMonitorConfig) -> Self {
        Self {
            metrics: Mutex::new(RingBuffer::new(config.capacity)),
            slow_threshold: Duration::from_millis(config.slow_threshold_ms),
            recent_window: config.recent_window,
        }
    }

    /// Run `f`, record its outcome and return its result unchanged.
    pub async fn measure_query<F, Fut, T, E>(&self, name: &str, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.measure_with(name, f, |_| None).await
    }

    /// Like [`measure_query`](Self::measure_query), also recording the row count.
    pub async fn measure_rows<F, Fut, T, E>(&self, name: &str, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: RowCount,
        E: Display,
    {
        self.measure_with(name, f, RowCount::row_count).await
    }

    async fn measure_with<F, Fut, T, E, R>(&self, name: &str, f: F, rows: R) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        R: FnOnce(&T) -> Option<usize>,
    {
        let start_time = epoch_millis();
        let started = Instant::now();

        let result = f().await;

        let duration = started.elapsed();
        let (success, error, row_count) = match &result {
            Ok(value) => (true, None, rows(value)),
            Err(e) => (false, Some(e.to_string()), None),
        };

        let duration_ms = duration.as_millis() as u64;
        let metric = QueryMetric {
            query_name: name.to_string(),
            start_time,
            end_time: start_time + duration_ms,
            duration_ms,
            slow: duration_ms > self.slow_threshold.as_millis() as u64,
            success,
            error,
            row_count,
        };

        if metric.slow {
            tracing::warn!(
                query = %name,
                duration_ms,
                threshold_ms = self.slow_threshold.as_millis() as u64,
                "Slow query detected"
            );
        }
        if let Some(error) = &metric.error {
            tracing::debug!(query = %name, error = %error, "Query failed");
        }

        metrics::record_query(name, duration, success);
        self.lock_metrics().push(metric);

        result
    }

    /// Aggregate the retained metrics.
    pub fn performance_stats(&self) -> PerformanceStats {
        let buffer = self.lock_metrics();
        let total = buffer.len();

        if total == 0 {
            return PerformanceStats {
                total_queries: 0,
                average_duration_ms: 0.0,
                slow_queries: 0,
                success_rate: 0.0,
                recent: Vec::new(),
            };
        }

        let total_duration: u64 = buffer.iter().map(|m| m.duration_ms).sum();
        let slow_queries = buffer.iter().filter(|m| m.slow).count();
        let successes = buffer.iter().filter(|m| m.success).count();

        PerformanceStats {
            total_queries: total,
            average_duration_ms: total_duration as f64 / total as f64,
            slow_queries,
            success_rate: successes as f64 / total as f64,
            recent: buffer.recent(self.recent_window).cloned().collect(),
        }
    }

    pub fn clear(&self) {
        self.lock_metrics().clear();
    }

    fn lock_metrics(&self) -> MutexGuard<'_, RingBuffer<QueryMetric>> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for QueryPerformanceMonitor {
    fn default() -> Self {
        Self::new(&QueryMonitorConfig::default())
    }
}
