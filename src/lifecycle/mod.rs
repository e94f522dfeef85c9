//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Init (init.rs):
//!     begin() claims initialization → succeed() / fail()
//!
//! Shutdown (shutdown.rs):
//!     SIGTERM/SIGINT → trigger() → admin server drains → flush state → exit
//!
//! Debounce (debounce.rs):
//!     schedule() → (re-arm aborts previous) → delay elapses → task runs
//!
//! Recovery (recovery.rs):
//!     error log entries → window count ≥ threshold → recovery actions
//! ```
//!
//! # Design Decisions
//! - No process-wide flags: state is owned by the context that needs it
//! - Every timer is a task handle that is aborted when its owner goes away
//! - Recovery is rate limited by a cooldown

pub mod debounce;
pub mod init;
pub mod recovery;
pub mod shutdown;

pub use debounce::Debouncer;
pub use init::{InitPhase, InitState};
pub use recovery::{AutoRecovery, RecoveryStatus};
pub use shutdown::Shutdown;
