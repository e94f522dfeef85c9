//! Reachability probes.
//!
//! # Responsibilities
//! - Issue a HEAD request for a URL under a deadline
//! - Report the response status, or why no response arrived
//! - Guard probes with a per-host circuit breaker and record their latency
//!
//! # Design Decisions
//! - Probes are a trait so the validator can be driven by fakes in tests
//! - The probe reports the raw status; deciding what counts as reachable is
//!   the validator's job
//! - Any response closes the host's breaker; only transport failures and
//!   timeouts count against it

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::observability::query_monitor::QueryPerformanceMonitor;
use crate::resilience::circuit_breaker::{BreakerError, BreakerRegistry};
use crate::resilience::timeouts::{with_timeout, TimeoutError};

/// Query name under which guarded probes are measured.
pub const PROBE_QUERY: &str = "resource_probe";

/// Name of the breaker guarding probes to `host`.
pub fn probe_breaker_name(host: &str) -> String {
    format!("resource:{}", host)
}

/// Why a probe produced no response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("circuit '{0}' is open")]
    CircuitOpen(String),
}

/// Something that can check whether a URL answers.
#[async_trait]
pub trait ResourceProbe: Send + Sync {
    /// Returns the HTTP status of the response.
    async fn probe(&self, url: &str) -> Result<u16, ProbeError>;
}

/// HEAD-request probe backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("paes-resilience-probe/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProbeError::Network(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    /// Use a preconfigured client (proxy settings, TLS roots).
    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl ResourceProbe for HttpProbe {
    async fn probe(&self, url: &str) -> Result<u16, ProbeError> {
        let parsed = url::Url::parse(url).map_err(|e| ProbeError::InvalidUrl(e.to_string()))?;

        match with_timeout(self.timeout, self.client.head(parsed).send()).await {
            Ok(response) => Ok(response.status().as_u16()),
            Err(TimeoutError::Elapsed(limit)) => Err(ProbeError::Timeout(limit)),
            Err(TimeoutError::Inner(e)) => Err(ProbeError::Network(e.to_string())),
        }
    }
}

/// Wraps another probe with a per-host circuit breaker and query timing.
pub struct GuardedProbe {
    inner: Arc<dyn ResourceProbe>,
    breakers: Arc<BreakerRegistry>,
    queries: Arc<QueryPerformanceMonitor>,
}

impl GuardedProbe {
    pub fn new(
        inner: Arc<dyn ResourceProbe>,
        breakers: Arc<BreakerRegistry>,
        queries: Arc<QueryPerformanceMonitor>,
    ) -> Self {
        Self {
            inner,
            breakers,
            queries,
        }
    }
}

#[async_trait]
impl ResourceProbe for GuardedProbe {
    async fn probe(&self, url: &str) -> Result<u16, ProbeError> {
        let parsed = url::Url::parse(url).map_err(|e| ProbeError::InvalidUrl(e.to_string()))?;
        let Some(host) = parsed.host_str() else {
            return Err(ProbeError::InvalidUrl(format!("no host in '{}'", url)));
        };

        let breaker = self.breakers.get_or_create(&probe_breaker_name(host));
        let result = breaker
            .call(|| {
                self.queries
                    .measure_query(PROBE_QUERY, || self.inner.probe(url))
            })
            .await;

        result.map_err(|e| match e {
            BreakerError::Open { name, .. } => {
                tracing::debug!(url = %url, breaker = %name, "Probe skipped, circuit open");
                ProbeError::CircuitOpen(name)
            }
            BreakerError::Inner(e) => e,
        })
    }
}

impl std::fmt::Debug for GuardedProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedProbe")
            .field("breakers", &self.breakers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BreakerConfig, QueryMonitorConfig};
    use crate::resilience::circuit_breaker::CircuitState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProbe {
        result: Result<u16, ProbeError>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ResourceProbe for CountingProbe {
        async fn probe(&self, _url: &str) -> Result<u16, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn guarded(
        result: Result<u16, ProbeError>,
    ) -> (GuardedProbe, Arc<CountingProbe>, Arc<BreakerRegistry>, Arc<QueryPerformanceMonitor>) {
        let inner = Arc::new(CountingProbe {
            result,
            calls: AtomicUsize::new(0),
        });
        let breakers = Arc::new(BreakerRegistry::new(BreakerConfig {
            failure_threshold: 2,
            reset_timeout_ms: 60_000,
        }));
        let queries = Arc::new(QueryPerformanceMonitor::new(&QueryMonitorConfig::default()));
        let probe = GuardedProbe::new(inner.clone(), breakers.clone(), queries.clone());
        (probe, inner, breakers, queries)
    }

    #[tokio::test]
    async fn test_failures_open_the_host_breaker() {
        let (probe, inner, breakers, queries) =
            guarded(Err(ProbeError::Network("connection refused".into())));
        let url = "https://cdn.example.com/logo.png";

        for _ in 0..2 {
            assert_eq!(
                probe.probe(url).await,
                Err(ProbeError::Network("connection refused".into()))
            );
        }
        let breaker = breakers.get_or_create("resource:cdn.example.com");
        assert_eq!(breaker.current_state(), CircuitState::Open);

        assert_eq!(
            probe.probe(url).await,
            Err(ProbeError::CircuitOpen("resource:cdn.example.com".into()))
        );
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);

        let stats = queries.performance_stats();
        assert_eq!(stats.total_queries, 2);
        assert_eq!(stats.recent[0].query_name, PROBE_QUERY);
    }

    #[tokio::test]
    async fn test_any_response_counts_as_success() {
        let (probe, _, breakers, queries) = guarded(Ok(404));

        assert_eq!(probe.probe("https://cdn.example.com/missing.png").await, Ok(404));
        assert_eq!(
            breakers.get_or_create("resource:cdn.example.com").failure_count(),
            0
        );
        assert_eq!(queries.performance_stats().success_rate, 1.0);
    }

    #[tokio::test]
    async fn test_invalid_url_skips_breaker() {
        let (probe, inner, breakers, _) = guarded(Ok(200));

        assert!(matches!(
            probe.probe("not a url").await,
            Err(ProbeError::InvalidUrl(_))
        ));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 0);
        assert!(breakers.is_empty());
    }
}
