//! Circuit breaker for protecting calls to a failing dependency.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: exactly one probe call decides whether to close or reopen
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: reset_timeout elapsed, first caller wins the probe
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails (next_attempt_time restarts)
//! ```
//!
//! # Design Decisions
//! - One breaker per protected call site, kept in a [`BreakerRegistry`]
//! - `current_state()` never mutates; the Open → Half-Open step only happens
//!   in `attempt_transition()`/`is_open()` under the state lock, so concurrent
//!   callers cannot both win the probe
//! - Listeners run after the lock is released

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::observability::metrics;
use crate::resilience::retries::{retry_with_backoff, RetryPolicy};

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }

    fn gauge_value(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    #[error("circuit '{name}' is open, retry in {retry_in:?}")]
    Open { name: String, retry_in: Duration },
    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Inner(e) => Some(e),
            BreakerError::Open { .. } => None,
        }
    }
}

/// Result of asking the breaker whether a call may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    /// Closed: call normally.
    Allowed,
    /// This caller owns the single half-open probe.
    Probe,
    /// Open, or a probe is already in flight.
    Rejected,
}

/// Callback receiving the breaker name.
pub type StateListener = Box<dyn Fn(&str) + Send + Sync>;

/// Serializable view of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    /// Time until a probe is allowed, while open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_in_ms: Option<u64>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    next_attempt_time: Option<Instant>,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            next_attempt_time: None,
        }
    }
}

#[derive(Clone, Copy)]
enum Transition {
    Opened,
    Closed,
}

/// Three-state failure counter guarding one dependency.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    state: Mutex<BreakerState>,
    on_open: Option<StateListener>,
    on_close: Option<StateListener>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: &BreakerConfig) -> Self {
        let breaker = Self {
            name: name.into(),
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: config.reset_timeout(),
            state: Mutex::new(BreakerState::new()),
            on_open: None,
            on_close: None,
        };
        metrics::record_breaker_state(&breaker.name, CircuitState::Closed.gauge_value());
        breaker
    }

    /// Called every time the circuit opens.
    pub fn on_open(mut self, listener: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_open = Some(Box::new(listener));
        self
    }

    /// Called every time the circuit closes (probe success or reset).
    pub fn on_close(mut self, listener: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Box::new(listener));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record a successful call.
    pub fn success(&self) {
        let transition = {
            let mut state = self.lock_state();
            state.failure_count = 0;
            if state.state == CircuitState::HalfOpen {
                state.state = CircuitState::Closed;
                state.next_attempt_time = None;
                Some(Transition::Closed)
            } else {
                None
            }
        };
        self.notify(transition);
    }

    /// Record a failed call.
    ///
    /// Failures reported while already open (late results of calls started
    /// before the circuit opened) only bump the counter.
    pub fn failure(&self) {
        let transition = {
            let mut state = self.lock_state();
            state.failure_count = state.failure_count.saturating_add(1);

            let should_open = match state.state {
                CircuitState::HalfOpen => true,
                CircuitState::Closed => state.failure_count >= self.failure_threshold,
                CircuitState::Open => false,
            };

            if should_open {
                state.state = CircuitState::Open;
                state.next_attempt_time = Some(Instant::now() + self.reset_timeout);
                Some(Transition::Opened)
            } else {
                None
            }
        };
        self.notify(transition);
    }

    /// True while calls must be rejected.
    ///
    /// After the reset timeout, exactly one caller gets `false` and owns the
    /// half-open probe; everyone else keeps getting `true` until the probe
    /// reports back through `success()` or `failure()`.
    pub fn is_open(&self) -> bool {
        self.acquire() == Permit::Rejected
    }

    /// Decide whether a call may proceed, performing the Open → Half-Open
    /// step when the timeout has elapsed.
    pub fn acquire(&self) -> Permit {
        let mut state = self.lock_state();
        let current = state.state;
        match current {
            CircuitState::Closed => Permit::Allowed,
            CircuitState::HalfOpen => Permit::Rejected,
            CircuitState::Open => {
                if Self::try_half_open(&mut state) {
                    drop(state);
                    self.announce(CircuitState::HalfOpen);
                    Permit::Probe
                } else {
                    Permit::Rejected
                }
            }
        }
    }

    /// Pure state query; never transitions.
    pub fn current_state(&self) -> CircuitState {
        self.lock_state().state
    }

    /// Move Open → Half-Open if the reset timeout has elapsed.
    /// Returns true only for the caller that performed the transition.
    pub fn attempt_transition(&self) -> bool {
        let won = Self::try_half_open(&mut self.lock_state());
        if won {
            self.announce(CircuitState::HalfOpen);
        }
        won
    }

    /// Force the circuit closed and clear the failure count.
    pub fn reset(&self) {
        {
            let mut state = self.lock_state();
            *state = BreakerState::new();
        }
        self.notify(Some(Transition::Closed));
    }

    pub fn failure_count(&self) -> u32 {
        self.lock_state().failure_count
    }

    /// When the next probe is allowed; `None` unless the circuit has opened.
    pub fn next_attempt_time(&self) -> Option<Instant> {
        self.lock_state().next_attempt_time
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.lock_state();
        let retry_in_ms = match (state.state, state.next_attempt_time) {
            (CircuitState::Open, Some(at)) => {
                Some(at.saturating_duration_since(Instant::now()).as_millis() as u64)
            }
            _ => None,
        };
        BreakerSnapshot {
            name: self.name.clone(),
            state: state.state,
            failure_count: state.failure_count,
            failure_threshold: self.failure_threshold,
            reset_timeout_ms: self.reset_timeout.as_millis() as u64,
            retry_in_ms,
        }
    }

    /// Gate, run and record a single call.
    ///
    /// If the future is dropped while it holds the half-open probe, the probe
    /// counts as failed so the circuit does not stay half-open forever.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.acquire();
        if permit == Permit::Rejected {
            return Err(self.open_error());
        }

        let mut guard = ProbeGuard {
            breaker: self,
            armed: permit == Permit::Probe,
        };
        let result = f().await;
        guard.armed = false;

        match result {
            Ok(value) => {
                self.success();
                Ok(value)
            }
            Err(e) => {
                self.failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// Like [`call`](Self::call), retrying retryable errors with backoff while
    /// the circuit lets calls through.
    pub async fn execute<F, Fut, T, E, P>(
        &self,
        policy: &RetryPolicy,
        mut op: F,
        is_retryable: P,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        retry_with_backoff(
            policy,
            |_| {
                let fut = op();
                self.call(move || fut)
            },
            |e: &BreakerError<E>| match e {
                BreakerError::Open { .. } => false,
                BreakerError::Inner(inner) => is_retryable(inner),
            },
        )
        .await
    }

    fn open_error<E>(&self) -> BreakerError<E> {
        let retry_in = self
            .next_attempt_time()
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or_default();
        BreakerError::Open {
            name: self.name.clone(),
            retry_in,
        }
    }

    fn try_half_open(state: &mut BreakerState) -> bool {
        if state.state != CircuitState::Open {
            return false;
        }
        match state.next_attempt_time {
            Some(at) if Instant::now() < at => false,
            _ => {
                state.state = CircuitState::HalfOpen;
                true
            }
        }
    }

    fn notify(&self, transition: Option<Transition>) {
        match transition {
            Some(Transition::Opened) => {
                self.announce(CircuitState::Open);
                if let Some(listener) = &self.on_open {
                    listener(&self.name);
                }
            }
            Some(Transition::Closed) => {
                self.announce(CircuitState::Closed);
                if let Some(listener) = &self.on_close {
                    listener(&self.name);
                }
            }
            None => {}
        }
    }

    fn announce(&self, to: CircuitState) {
        match to {
            CircuitState::Open => tracing::warn!(
                breaker = %self.name,
                reset_timeout_ms = self.reset_timeout.as_millis() as u64,
                "Circuit opened"
            ),
            CircuitState::HalfOpen => {
                tracing::info!(breaker = %self.name, "Circuit half-open, probing")
            }
            CircuitState::Closed => tracing::info!(breaker = %self.name, "Circuit closed"),
        }
        metrics::record_breaker_state(&self.name, to.gauge_value());
        metrics::record_breaker_transition(&self.name, to.as_str());
    }

    fn lock_state(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("failure_threshold", &self.failure_threshold)
            .field("reset_timeout", &self.reset_timeout)
            .field("state", &*self.lock_state())
            .finish()
    }
}

struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(breaker = %self.breaker.name, "Half-open probe abandoned");
            self.breaker.failure();
        }
    }
}

/// Named breakers sharing one default configuration.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    defaults: ArcSwap<BreakerConfig>,
}

impl BreakerRegistry {
    pub fn new(defaults: BreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            defaults: ArcSwap::from_pointee(defaults),
        }
    }

    /// Fetch a breaker, creating it from the current defaults if needed.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.clone();
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(breaker = %name, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(name, &self.defaults.load()))
            })
            .clone()
    }

    /// Register a pre-built breaker (custom thresholds or listeners).
    pub fn insert(&self, breaker: CircuitBreaker) -> Arc<CircuitBreaker> {
        let breaker = Arc::new(breaker);
        self.breakers
            .insert(breaker.name().to_string(), breaker.clone());
        breaker
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| b.value().clone())
    }

    /// Reset one breaker. Returns false if it does not exist.
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        for breaker in self.all() {
            breaker.reset();
        }
    }

    /// Snapshots sorted by name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self.all().iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// New defaults apply to breakers created afterwards.
    pub fn set_defaults(&self, defaults: BreakerConfig) {
        self.defaults.store(Arc::new(defaults));
    }

    pub fn defaults(&self) -> BreakerConfig {
        self.defaults.load().as_ref().clone()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    fn all(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers.iter().map(|r| r.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(failure_threshold: u32, reset_timeout_ms: u64) -> BreakerConfig {
        BreakerConfig {
            failure_threshold,
            reset_timeout_ms,
        }
    }

    fn open_breaker(breaker: &CircuitBreaker, threshold: u32) {
        for _ in 0..threshold {
            breaker.failure();
        }
        assert_eq!(breaker.current_state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_failures_open_then_half_open_after_timeout() {
        let breaker = CircuitBreaker::new("supabase", &config(3, 1000));

        breaker.failure();
        breaker.failure();
        assert_eq!(breaker.current_state(), CircuitState::Closed);
        breaker.failure();
        assert_eq!(breaker.current_state().as_str(), "open");

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(breaker.is_open());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!breaker.is_open());
        assert_eq!(breaker.current_state().as_str(), "half-open");

        // The probe is taken; others keep being rejected.
        assert!(breaker.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes() {
        let breaker = CircuitBreaker::new("openrouter", &config(3, 1000));
        open_breaker(&breaker, 3);
        tokio::time::advance(Duration::from_millis(1000)).await;
        assert!(!breaker.is_open());

        breaker.success();
        assert_eq!(breaker.current_state().as_str(), "closed");
        assert_eq!(breaker.failure_count(), 0);
        assert!(!breaker.is_open());
        assert!(!breaker.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_with_new_deadline() {
        let breaker = CircuitBreaker::new("progress", &config(3, 1000));
        open_breaker(&breaker, 3);
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert!(!breaker.is_open());

        breaker.failure();
        assert_eq!(breaker.current_state().as_str(), "open");
        assert_eq!(
            breaker.next_attempt_time(),
            Some(Instant::now() + Duration::from_millis(1000))
        );
        assert!(breaker.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_from_any_state() {
        let breaker = CircuitBreaker::new("db", &config(2, 1000));

        breaker.failure();
        breaker.reset();
        assert_eq!(breaker.current_state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);

        open_breaker(&breaker, 2);
        breaker.reset();
        assert_eq!(breaker.current_state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);

        open_breaker(&breaker, 2);
        tokio::time::advance(Duration::from_millis(1000)).await;
        assert!(breaker.attempt_transition());
        breaker.reset();
        assert_eq!(breaker.current_state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(breaker.next_attempt_time(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_state_is_pure() {
        let breaker = CircuitBreaker::new("pure", &config(1, 100));
        breaker.failure();
        tokio::time::advance(Duration::from_millis(200)).await;

        assert_eq!(breaker.current_state(), CircuitState::Open);
        assert_eq!(breaker.current_state(), CircuitState::Open);
        assert!(breaker.attempt_transition());
        assert!(!breaker.attempt_transition());
        assert_eq!(breaker.current_state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_consecutive_failures() {
        let breaker = CircuitBreaker::new("flaky", &config(3, 1000));
        breaker.failure();
        breaker.failure();
        breaker.success();
        breaker.failure();
        breaker.failure();
        assert_eq!(breaker.current_state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listeners_fire_on_transitions() {
        let opened = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let (o, c) = (opened.clone(), closed.clone());

        let breaker = CircuitBreaker::new("listeners", &config(1, 100))
            .on_open(move |_| {
                o.fetch_add(1, Ordering::SeqCst);
            })
            .on_close(move |name| {
                assert_eq!(name, "listeners");
                c.fetch_add(1, Ordering::SeqCst);
            });

        breaker.failure();
        breaker.failure();
        assert_eq!(opened.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(!breaker.is_open());
        breaker.success();
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        breaker.reset();
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_single_probe_across_threads() {
        let breaker = Arc::new(CircuitBreaker::new("contended", &config(1, 20)));
        breaker.failure();
        std::thread::sleep(Duration::from_millis(40));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let breaker = breaker.clone();
                std::thread::spawn(move || !breaker.is_open())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(breaker.current_state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_rejects_without_running_when_open() {
        let breaker = CircuitBreaker::new("call", &config(1, 1000));
        let runs = AtomicUsize::new(0);

        let result: Result<(), _> = breaker
            .call(|| async {
                runs.fetch_add(1, Ordering::SeqCst);
                Err("boom")
            })
            .await;
        assert_eq!(result.unwrap_err().into_inner(), Some("boom"));

        let result: Result<(), BreakerError<&str>> = breaker
            .call(|| async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(result.unwrap_err().is_open());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_probe_counts_as_failure() {
        let breaker = CircuitBreaker::new("abandoned", &config(1, 100));
        breaker.failure();
        tokio::time::advance(Duration::from_millis(100)).await;

        let probe = breaker.call(|| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, &str>(())
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(10), probe).await;
        assert!(timed_out.is_err());

        assert_eq!(breaker.current_state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_retries_until_circuit_opens() {
        let breaker = CircuitBreaker::new("execute", &config(2, 10_000));
        let runs = AtomicUsize::new(0);

        let result: Result<(), _> = breaker
            .execute(
                &RetryPolicy {
                    max_attempts: 5,
                    base_delay_ms: 10,
                    max_delay_ms: 50,
                },
                || async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("unavailable")
                },
                |_| true,
            )
            .await;

        assert!(result.unwrap_err().is_open());
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_registry() {
        let registry = BreakerRegistry::new(config(2, 1000));
        let a = registry.get_or_create("chat");
        let again = registry.get_or_create("chat");
        assert!(Arc::ptr_eq(&a, &again));

        registry.get_or_create("auth");
        a.failure();
        a.failure();

        let snapshots = registry.snapshots();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].name, "auth");
        assert_eq!(snapshots[1].state, CircuitState::Open);
        assert!(snapshots[1].retry_in_ms.is_some());

        assert!(registry.reset("chat"));
        assert!(!registry.reset("missing"));
        assert_eq!(a.current_state(), CircuitState::Closed);

        registry.set_defaults(config(7, 500));
        let created = registry.get_or_create("later");
        assert_eq!(created.snapshot().failure_threshold, 7);
        assert_eq!(a.snapshot().failure_threshold, 2);
    }

    #[test]
    fn test_snapshot_serializes_kebab_case_state() {
        let breaker = CircuitBreaker::new("json", &config(1, 1000));
        let json = serde_json::to_value(breaker.snapshot()).unwrap();
        assert_eq!(json["state"], "closed");
        assert!(json.get("retry_in_ms").is_none());
    }
}
