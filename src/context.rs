//! Shared service state.
//!
//! # Responsibilities
//! - Own one instance of every utility, built from a [`ServiceConfig`]
//! - Wire cross-cutting hooks once: panic capture, auto recovery
//! - Apply reloaded configuration to the parts that support it
//!
//! # Design Decisions
//! - Built explicitly and passed around as `Arc<ResilienceContext>`;
//!   there are no globals
//! - Collaborators with I/O (probe, store) are injected so tests can use
//!   in-memory fakes
//! - The injected probe is always wrapped in a [`GuardedProbe`], so resource
//!   checks show up in the breaker and query listings

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::config::ServiceConfig;
use crate::entropy::RandomCache;
use crate::health::probe::{GuardedProbe, HttpProbe, ProbeError, ResourceProbe};
use crate::health::resource::ResourceValidator;
use crate::lifecycle::init::{InitPhase, InitState};
use crate::lifecycle::recovery::AutoRecovery;
use crate::navigation::predictor::NavigationPredictor;
use crate::navigation::store::{FileStore, KeyValueStore};
use crate::observability::query_monitor::QueryPerformanceMonitor;
use crate::observability::system_log::SystemLogger;
use crate::resilience::circuit_breaker::BreakerRegistry;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("failed to build resource probe: {0}")]
    Probe(#[from] ProbeError),
}

pub struct ResilienceContext {
    config: ArcSwap<ServiceConfig>,
    pub logger: Arc<SystemLogger>,
    pub breakers: Arc<BreakerRegistry>,
    pub resources: Arc<ResourceValidator>,
    pub queries: Arc<QueryPerformanceMonitor>,
    pub navigation: Arc<NavigationPredictor>,
    pub entropy: Arc<RandomCache>,
    pub recovery: Arc<AutoRecovery>,
    init: InitState,
    started_at: Instant,
}

impl ResilienceContext {
    /// Build with the production probe and a file store under
    /// `navigation.store_dir`.
    pub fn from_config(config: ServiceConfig) -> Result<Arc<Self>, ContextError> {
        let probe = Arc::new(HttpProbe::new(config.resources.probe_timeout())?);
        let store = Arc::new(FileStore::new(config.navigation.store_dir.clone()));
        Ok(Self::new(config, probe, store))
    }

    pub fn new(
        config: ServiceConfig,
        probe: Arc<dyn ResourceProbe>,
        store: Arc<dyn KeyValueStore>,
    ) -> Arc<Self> {
        let breakers = Arc::new(BreakerRegistry::new(config.breaker.clone()));
        let queries = Arc::new(QueryPerformanceMonitor::new(&config.queries));
        let probe = Arc::new(GuardedProbe::new(probe, breakers.clone(), queries.clone()));

        Arc::new(Self {
            logger: Arc::new(SystemLogger::new(&config.logging)),
            resources: Arc::new(ResourceValidator::new(probe, &config.resources)),
            breakers,
            queries,
            navigation: Arc::new(NavigationPredictor::load(store, &config.navigation)),
            entropy: Arc::new(RandomCache::new(&config.entropy)),
            recovery: Arc::new(AutoRecovery::new(&config.recovery)),
            config: ArcSwap::from_pointee(config),
            init: InitState::new(),
            started_at: Instant::now(),
        })
    }

    /// Install hooks. Only the first call does anything.
    pub fn initialize(&self) -> bool {
        if !self.init.begin() {
            return false;
        }

        let config = self.config();
        if config.logging.capture_panics {
            self.logger.install_panic_hook();
        }

        if config.recovery.enabled {
            let resources = self.resources.clone();
            self.recovery
                .register("clear_resource_cache", move || resources.clear());
            let breakers = self.breakers.clone();
            self.recovery
                .register("reset_breakers", move || breakers.reset_all());
            let entropy = self.entropy.clone();
            self.recovery
                .register("refresh_entropy", move || entropy.invalidate());
            self.recovery.attach(&self.logger);
        }

        self.init.succeed();
        tracing::info!(
            recovery = config.recovery.enabled,
            capture_panics = config.logging.capture_panics,
            "Resilience context initialized"
        );
        true
    }

    pub fn init_phase(&self) -> InitPhase {
        self.init.phase()
    }

    pub fn config(&self) -> Arc<ServiceConfig> {
        self.config.load_full()
    }

    /// Swap in a reloaded configuration.
    ///
    /// Log threshold, production mode and breaker defaults take effect
    /// immediately; other sections apply on restart.
    pub fn apply_config(&self, new: ServiceConfig) {
        self.logger.set_min_level(new.logging.min_level);
        self.logger.set_production(new.logging.production);

        let old = self.config.load();
        if old.breaker != new.breaker {
            tracing::info!(
                failure_threshold = new.breaker.failure_threshold,
                reset_timeout_ms = new.breaker.reset_timeout_ms,
                "Breaker defaults updated"
            );
        }
        self.breakers.set_defaults(new.breaker.clone());
        self.config.store(Arc::new(new));
        tracing::info!("Configuration applied");
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Persist state that outlives the process.
    pub fn flush(&self) {
        if let Err(e) = self.navigation.flush() {
            tracing::error!(error = %e, "Failed to flush navigation patterns");
        }
    }
}

impl std::fmt::Debug for ResilienceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceContext")
            .field("init", &self.init.phase())
            .field("breakers", &self.breakers.len())
            .finish()
    }
}
