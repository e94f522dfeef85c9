//! Automatic recovery after bursts of errors.
//!
//! # Responsibilities
//! - Count error/critical log entries inside a sliding window
//! - Run registered recovery actions once the threshold is reached
//! - Rate limit recoveries with a cooldown
//!
//! # Design Decisions
//! - Fed by a [`SystemLogger`] error listener, so anything that logs an
//!   error participates without knowing about recovery
//! - Actions run after the counter lock is released and must not log
//!   through the same `SystemLogger`; they report via `tracing`

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::RecoveryConfig;
use crate::observability::metrics;
use crate::observability::system_log::SystemLogger;
use crate::time::epoch_millis;

pub type RecoveryAction = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Serialize)]
pub struct RecoveryStatus {
    pub recent_errors: usize,
    pub threshold: u32,
    pub recoveries: u64,
    /// Epoch milliseconds of the last recovery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_recovery: Option<u64>,
    pub actions: Vec<String>,
}

#[derive(Debug, Default)]
struct Counters {
    errors: VecDeque<Instant>,
    last_run: Option<Instant>,
    last_run_epoch: Option<u64>,
    runs: u64,
}

pub struct AutoRecovery {
    threshold: u32,
    window: Duration,
    cooldown: Duration,
    counters: Mutex<Counters>,
    actions: RwLock<Vec<(String, RecoveryAction)>>,
}

impl AutoRecovery {
    pub fn new(config: &RecoveryConfig) -> Self {
        Self {
            threshold: config.error_threshold.max(1),
            window: Duration::from_secs(config.window_secs),
            cooldown: Duration::from_secs(config.cooldown_secs),
            counters: Mutex::new(Counters::default()),
            actions: RwLock::new(Vec::new()),
        }
    }

    /// Register an action run on every recovery, in registration order.
    pub fn register(&self, name: impl Into<String>, action: impl Fn() + Send + Sync + 'static) {
        self.actions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.into(), Box::new(action)));
    }

    /// Feed every error and critical entry of `logger` into this counter.
    pub fn attach(self: &Arc<Self>, logger: &SystemLogger) {
        let recovery = Arc::downgrade(self);
        logger.add_error_listener(Box::new(move |_entry| {
            if let Some(recovery) = recovery.upgrade() {
                recovery.record_error();
            }
        }));
    }

    /// Count one error. Returns true if it triggered a recovery.
    pub fn record_error(&self) -> bool {
        let now = Instant::now();
        {
            let mut counters = self.lock_counters();
            while counters
                .errors
                .front()
                .is_some_and(|at| now.duration_since(*at) >= self.window)
            {
                counters.errors.pop_front();
            }
            counters.errors.push_back(now);

            if counters.errors.len() < self.threshold as usize {
                return false;
            }
            if let Some(last) = counters.last_run {
                if now.duration_since(last) < self.cooldown {
                    tracing::debug!(
                        errors = counters.errors.len(),
                        "Recovery threshold reached during cooldown"
                    );
                    return false;
                }
            }

            counters.errors.clear();
            counters.last_run = Some(now);
            counters.last_run_epoch = Some(epoch_millis());
            counters.runs += 1;
        }

        self.run_actions();
        true
    }

    /// Run every action now, ignoring threshold and cooldown.
    pub fn trigger(&self) {
        {
            let mut counters = self.lock_counters();
            counters.errors.clear();
            counters.last_run = Some(Instant::now());
            counters.last_run_epoch = Some(epoch_millis());
            counters.runs += 1;
        }
        self.run_actions();
    }

    pub fn status(&self) -> RecoveryStatus {
        let counters = self.lock_counters();
        let actions = self
            .actions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, _)| name.clone())
            .collect();

        RecoveryStatus {
            recent_errors: counters.errors.len(),
            threshold: self.threshold,
            recoveries: counters.runs,
            last_recovery: counters.last_run_epoch,
            actions,
        }
    }

    fn run_actions(&self) {
        let actions = self.actions.read().unwrap_or_else(PoisonError::into_inner);
        tracing::warn!(
            threshold = self.threshold,
            actions = actions.len(),
            "Error threshold reached, running recovery"
        );
        for (name, action) in actions.iter() {
            tracing::info!(action = %name, "Running recovery action");
            action();
        }
        metrics::record_recovery();
    }

    fn lock_counters(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for AutoRecovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoRecovery")
            .field("threshold", &self.threshold)
            .field("window", &self.window)
            .field("cooldown", &self.cooldown)
            .finish()
    }
}
