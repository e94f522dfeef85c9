//! Cached reachability checks for static resources.
//!
//! # Responsibilities
//! - Answer repeated checks for the same URL from cache while fresh
//! - Probe stale or unknown URLs and record the outcome
//! - Stop probing a URL after too many failed attempts
//!
//! # Design Decisions
//! - Any HTTP response counts as reachable by default. A cross-origin
//!   no-cors check cannot tell 200 from 404 either; `require_success_status`
//!   turns on status-aware checking
//! - Giving up is sticky until `forget()`/`clear()`
//! - Concurrent checks of one URL share a single in-flight probe; whoever
//!   retires the in-flight entry records the outcome
//! - Map guards are never held across the probe's await point

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{join_all, BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::time::Instant;

use crate::config::ResourceConfig;
use crate::health::probe::{ProbeError, ResourceProbe};
use crate::observability::metrics;
use crate::time::epoch_millis;

/// Last known state of one URL.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatus {
    pub url: String,
    pub is_loaded: bool,
    pub is_loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Epoch milliseconds of the last completed check (0 = never).
    pub last_checked: u64,
    pub failed_attempts: u32,
    #[serde(skip)]
    checked_at: Option<Instant>,
}

impl ResourceStatus {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            is_loaded: false,
            is_loading: false,
            error: None,
            last_checked: 0,
            failed_attempts: 0,
            checked_at: None,
        }
    }

    fn is_fresh(&self, freshness: Duration) -> bool {
        match self.checked_at {
            Some(at) => at.elapsed() < freshness,
            None => false,
        }
    }
}

enum CacheDecision {
    Cached(bool),
    GaveUp,
    Probe,
}

type SharedProbe = Shared<BoxFuture<'static, Result<u16, ProbeError>>>;

struct InFlight {
    id: u64,
    outcome: SharedProbe,
}

/// Reachability checker with a freshness window and a retry cap.
pub struct ResourceValidator {
    probe: Arc<dyn ResourceProbe>,
    statuses: DashMap<String, ResourceStatus>,
    in_flight: DashMap<String, InFlight>,
    next_probe_id: AtomicU64,
    freshness: Duration,
    max_retries: u32,
    require_success_status: bool,
}

impl ResourceValidator {
    pub fn new(probe: Arc<dyn ResourceProbe>, config: &ResourceConfig) -> Self {
        Self {
            probe,
            statuses: DashMap::new(),
            in_flight: DashMap::new(),
            next_probe_id: AtomicU64::new(0),
            freshness: config.freshness(),
            max_retries: config.max_retries,
            require_success_status: config.require_success_status,
        }
    }

    /// Whether `url` is reachable. Never fails; errors are recorded in the
    /// URL's [`ResourceStatus`].
    pub async fn validate_resource(&self, url: &str) -> bool {
        match self.decide(url) {
            CacheDecision::Cached(loaded) => {
                metrics::record_resource_check("cached");
                return loaded;
            }
            CacheDecision::GaveUp => {
                metrics::record_resource_check("gave_up");
                tracing::debug!(url = %url, max_retries = self.max_retries, "Resource retries exhausted");
                return false;
            }
            CacheDecision::Probe => {}
        }

        let (id, outcome) = self.join_or_start(url);
        let outcome = outcome.await;

        let (reachable, error) = match outcome {
            Ok(status) if !self.require_success_status || status < 400 => (true, None),
            Ok(status) => (false, Some(format!("HTTP status {}", status))),
            Err(e) => (false, Some(e.to_string())),
        };

        if self
            .in_flight
            .remove_if(url, |_, in_flight| in_flight.id == id)
            .is_some()
        {
            self.record(url, reachable, error);
        }
        reachable
    }

    /// Await the probe already running for `url`, or start one.
    fn join_or_start(&self, url: &str) -> (u64, SharedProbe) {
        let (id, outcome) = match self.in_flight.entry(url.to_string()) {
            Entry::Occupied(existing) => {
                metrics::record_resource_check("joined");
                tracing::trace!(url = %url, "Joining in-flight probe");
                let in_flight = existing.get();
                return (in_flight.id, in_flight.outcome.clone());
            }
            Entry::Vacant(slot) => {
                let id = self.next_probe_id.fetch_add(1, Ordering::Relaxed);
                let probe = self.probe.clone();
                let target = url.to_string();
                let outcome = async move { probe.probe(&target).await }.boxed().shared();
                slot.insert(InFlight {
                    id,
                    outcome: outcome.clone(),
                });
                (id, outcome)
            }
        };

        self.statuses
            .entry(url.to_string())
            .or_insert_with(|| ResourceStatus::new(url))
            .is_loading = true;
        (id, outcome)
    }

    fn record(&self, url: &str, reachable: bool, error: Option<String>) {
        let mut entry = self
            .statuses
            .entry(url.to_string())
            .or_insert_with(|| ResourceStatus::new(url));
        entry.is_loading = false;
        entry.is_loaded = reachable;
        entry.last_checked = epoch_millis();
        entry.checked_at = Some(Instant::now());

        if reachable {
            entry.error = None;
            entry.failed_attempts = 0;
            metrics::record_resource_check("reachable");
        } else {
            entry.failed_attempts = entry.failed_attempts.saturating_add(1);
            tracing::warn!(
                url = %url,
                attempt = entry.failed_attempts,
                error = error.as_deref().unwrap_or("unknown"),
                "Resource unreachable"
            );
            entry.error = error;
            metrics::record_resource_check("unreachable");
        }
    }

    /// Validate several URLs concurrently, preserving input order.
    pub async fn validate_many(&self, urls: &[String]) -> Vec<(String, bool)> {
        let checks = urls.iter().map(|url| async move {
            let reachable = self.validate_resource(url).await;
            (url.clone(), reachable)
        });
        join_all(checks).await
    }

    /// True while the URL's failed attempts are below the retry cap.
    pub fn should_retry(&self, url: &str) -> bool {
        self.statuses
            .get(url)
            .map(|s| s.failed_attempts < self.max_retries)
            .unwrap_or(true)
    }

    pub fn status(&self, url: &str) -> Option<ResourceStatus> {
        self.statuses.get(url).map(|s| s.value().clone())
    }

    /// All known statuses sorted by URL.
    pub fn statuses(&self) -> Vec<ResourceStatus> {
        let mut all: Vec<_> = self.statuses.iter().map(|s| s.value().clone()).collect();
        all.sort_by(|a, b| a.url.cmp(&b.url));
        all
    }

    /// Drop everything known about one URL, including its retry counter.
    pub fn forget(&self, url: &str) -> bool {
        self.in_flight.remove(url);
        self.statuses.remove(url).is_some()
    }

    pub fn clear(&self) {
        let dropped = self.statuses.len();
        self.statuses.clear();
        self.in_flight.clear();
        tracing::info!(dropped, "Resource cache cleared");
    }

    fn decide(&self, url: &str) -> CacheDecision {
        let Some(status) = self.statuses.get(url) else {
            return CacheDecision::Probe;
        };
        if status.is_fresh(self.freshness) {
            CacheDecision::Cached(status.is_loaded)
        } else if !status.is_loaded && status.failed_attempts >= self.max_retries {
            CacheDecision::GaveUp
        } else {
            CacheDecision::Probe
        }
    }
}

impl std::fmt::Debug for ResourceValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceValidator")
            .field("tracked", &self.statuses.len())
            .field("in_flight", &self.in_flight.len())
            .field("freshness", &self.freshness)
            .field("max_retries", &self.max_retries)
            .field("require_success_status", &self.require_success_status)
            .finish()
    }
}
