//! PAES resilience service.
//!
//! Hosts the resilience utilities behind an admin API.
//!
//! ```text
//!   config.toml ──▶ loader ──▶ ResilienceContext ◀── watcher (hot reload)
//!                                   │
//!        ┌──────────────┬───────────┼─────────────┬──────────────┐
//!        ▼              ▼           ▼             ▼              ▼
//!   BreakerRegistry  Resource   QueryMonitor  SystemLogger  Navigation
//!                    Validator                 │ ▲          Predictor
//!                                              ▼ │
//!                                          AutoRecovery
//!
//!   admin API (axum) ──▶ context          Prometheus exporter (optional)
//! ```
//!
//! Usage: `paes-resilience [config.toml]`, or set `PAES_CONFIG`.

use std::path::PathBuf;

use tokio::net::TcpListener;

use paes_resilience::admin::setup_admin_router;
use paes_resilience::config::loader::load_config;
use paes_resilience::config::validation::validate_config;
use paes_resilience::config::watcher::ConfigWatcher;
use paes_resilience::config::ServiceConfig;
use paes_resilience::observability::logging::init_tracing;
use paes_resilience::observability::metrics::init_metrics;
use paes_resilience::{ResilienceContext, Shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PAES_CONFIG").ok())
        .map(PathBuf::from);

    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => {
            let config = ServiceConfig::default();
            if let Err(errors) = validate_config(&config) {
                for e in &errors {
                    eprintln!("invalid default configuration: {}", e);
                }
                return Err("invalid default configuration".into());
            }
            config
        }
    };

    init_tracing(&config.logging);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?config_path,
        "paes-resilience starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let admin = config.admin.clone();
    let ctx = ResilienceContext::from_config(config)?;
    ctx.initialize();

    // Kept alive for the lifetime of the process.
    let _watcher = match &config_path {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let watcher = watcher.run()?;
            let reload_ctx = ctx.clone();
            tokio::spawn(async move {
                while let Some(new_config) = updates.recv().await {
                    reload_ctx.apply_config(new_config);
                }
            });
            Some(watcher)
        }
        None => None,
    };

    let shutdown = Shutdown::new();
    shutdown.listen_for_signals();

    if admin.enabled {
        let listener = TcpListener::bind(&admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");

        axum::serve(listener, setup_admin_router(ctx.clone()))
            .with_graceful_shutdown(shutdown.wait())
            .await?;
    } else {
        tracing::info!("Admin API disabled, waiting for shutdown signal");
        shutdown.wait().await;
    }

    let flushing = ctx.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || flushing.flush()).await {
        tracing::error!(error = %e, "Final flush did not complete");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
