//! Frequency-based next-route prediction.
//!
//! # Responsibilities
//! - Count route-to-route transitions
//! - Predict likely next routes, favouring recent transitions
//! - Persist the transition table through a [`KeyValueStore`]
//!
//! # Design Decisions
//! - Each source keeps only its most frequent outgoing edges
//! - Score is `frequency * (1 - age / window)`; edges outside the window
//!   are ignored but kept until pushed out by more frequent ones
//! - The whole table is written on every update unless a debounce delay is
//!   configured, in which case bursts collapse into one write
//! - A missing or unreadable blob starts an empty table

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::NavigationConfig;
use crate::lifecycle::debounce::Debouncer;
use crate::navigation::store::{KeyValueStore, StoreError};
use crate::observability::metrics;
use crate::time::epoch_millis;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

/// One observed transition out of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub to: String,
    pub frequency: u64,
    /// Epoch milliseconds.
    pub last_used: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub route: String,
    pub score: f64,
}

type NavigationTable = BTreeMap<String, Vec<Edge>>;

struct Shared {
    table: Mutex<NavigationTable>,
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, NavigationTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self) -> Result<(), StoreError> {
        let blob = serde_json::to_string(&*self.lock())?;
        self.store.set(&self.key, &blob)
    }
}

pub struct NavigationPredictor {
    shared: Arc<Shared>,
    debouncer: Option<Debouncer>,
    max_edges: usize,
    window_ms: u64,
    max_predictions: usize,
}

impl NavigationPredictor {
    /// Build a predictor, restoring any table previously stored under the
    /// configured key.
    pub fn load(store: Arc<dyn KeyValueStore>, config: &NavigationConfig) -> Self {
        let table = match store.get(&config.storage_key) {
            Ok(Some(blob)) => match serde_json::from_str::<NavigationTable>(&blob) {
                Ok(table) => {
                    tracing::debug!(routes = table.len(), "Navigation patterns restored");
                    table
                }
                Err(e) => {
                    tracing::warn!(key = %config.storage_key, error = %e, "Stored navigation patterns unreadable, starting empty");
                    NavigationTable::new()
                }
            },
            Ok(None) => NavigationTable::new(),
            Err(e) => {
                tracing::warn!(key = %config.storage_key, error = %e, "Failed to read navigation patterns, starting empty");
                NavigationTable::new()
            }
        };

        let debouncer = (config.persist_debounce_ms > 0)
            .then(|| Debouncer::new(Duration::from_millis(config.persist_debounce_ms)));

        Self {
            shared: Arc::new(Shared {
                table: Mutex::new(table),
                store,
                key: config.storage_key.clone(),
            }),
            debouncer,
            max_edges: config.max_edges_per_route.max(1),
            window_ms: config.window_days.max(1) * DAY_MS,
            max_predictions: config.max_predictions,
        }
    }

    /// Record a transition observed now.
    pub fn record_navigation(&self, from: &str, to: &str) -> Result<(), StoreError> {
        self.record_navigation_at(from, to, epoch_millis())
    }

    /// Record a transition at `now` (epoch ms).
    ///
    /// Writes block on the store. With debounced persistence this must run
    /// inside a tokio runtime; the write then happens on the blocking pool
    /// and its errors are logged instead of returned.
    pub fn record_navigation_at(&self, from: &str, to: &str, now: u64) -> Result<(), StoreError> {
        {
            let mut table = self.shared.lock();
            let edges = table.entry(from.to_string()).or_default();

            match edges.iter_mut().find(|e| e.to == to) {
                Some(edge) => {
                    edge.frequency += 1;
                    edge.last_used = now;
                }
                None => edges.push(Edge {
                    to: to.to_string(),
                    frequency: 1,
                    last_used: now,
                }),
            }

            edges.sort_by(|a, b| {
                b.frequency
                    .cmp(&a.frequency)
                    .then(b.last_used.cmp(&a.last_used))
            });
            edges.truncate(self.max_edges);
        }
        metrics::record_navigation();
        tracing::trace!(from = %from, to = %to, "Navigation recorded");

        match &self.debouncer {
            None => self.shared.persist(),
            Some(debouncer) => {
                let shared = self.shared.clone();
                debouncer.schedule(async move {
                    let writer = shared.clone();
                    let result = match tokio::task::spawn_blocking(move || writer.persist()).await {
                        Ok(result) => result,
                        Err(e) => Err(StoreError::Io(std::io::Error::other(e))),
                    };
                    if let Err(e) = result {
                        tracing::warn!(key = %shared.key, error = %e, "Failed to persist navigation patterns");
                    }
                });
                Ok(())
            }
        }
    }

    /// Most likely next routes from `route`, best first.
    pub fn predict_next(&self, route: &str) -> Vec<String> {
        self.predict_next_at(route, epoch_millis())
    }

    pub fn predict_next_at(&self, route: &str, now: u64) -> Vec<String> {
        self.scored_predictions_at(route, now)
            .into_iter()
            .map(|p| p.route)
            .collect()
    }

    pub fn scored_predictions(&self, route: &str) -> Vec<Prediction> {
        self.scored_predictions_at(route, epoch_millis())
    }

    pub fn scored_predictions_at(&self, route: &str, now: u64) -> Vec<Prediction> {
        let table = self.shared.lock();
        let Some(edges) = table.get(route) else {
            return Vec::new();
        };

        let window = self.window_ms as f64;
        let mut scored: Vec<Prediction> = edges
            .iter()
            .filter_map(|edge| {
                let age = now.saturating_sub(edge.last_used);
                (age < self.window_ms).then(|| Prediction {
                    route: edge.to.clone(),
                    score: edge.frequency as f64 * (1.0 - age as f64 / window),
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(self.max_predictions);
        scored
    }

    /// Outgoing edges recorded for `route`, most frequent first.
    pub fn edges(&self, route: &str) -> Vec<Edge> {
        self.shared.lock().get(route).cloned().unwrap_or_default()
    }

    pub fn route_count(&self) -> usize {
        self.shared.lock().len()
    }

    /// Write the table now, cancelling any pending debounced write.
    pub fn flush(&self) -> Result<(), StoreError> {
        if let Some(debouncer) = &self.debouncer {
            debouncer.cancel();
        }
        self.shared.persist()
    }

    /// Forget every transition and remove the stored blob.
    pub fn clear(&self) -> Result<(), StoreError> {
        if let Some(debouncer) = &self.debouncer {
            debouncer.cancel();
        }
        self.shared.lock().clear();
        self.shared.store.remove(&self.shared.key)
    }
}

impl std::fmt::Debug for NavigationPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationPredictor")
            .field("key", &self.shared.key)
            .field("routes", &self.route_count())
            .field("debounced", &self.debouncer.is_some())
            .finish()
    }
}
