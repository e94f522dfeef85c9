//! One-shot initialization state.
//!
//! Replaces process-wide "already initialized" flags with a value owned by
//! whoever performs the initialization.

use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum InitPhase {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
}

impl From<u8> for InitPhase {
    fn from(v: u8) -> Self {
        match v {
            1 => InitPhase::Initializing,
            2 => InitPhase::Ready,
            _ => InitPhase::Uninitialized,
        }
    }
}

/// Atomic initialization state machine.
///
/// ```text
/// Uninitialized --begin--> Initializing --succeed--> Ready
/// ```
#[derive(Debug, Default)]
pub struct InitState {
    phase: AtomicU8,
}

impl InitState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> InitPhase {
        InitPhase::from(self.phase.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.phase() == InitPhase::Ready
    }

    /// Claim the initialization. Only one caller ever gets `true`.
    pub fn begin(&self) -> bool {
        self.phase
            .compare_exchange(
                InitPhase::Uninitialized as u8,
                InitPhase::Initializing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn succeed(&self) {
        self.phase.store(InitPhase::Ready as u8, Ordering::Release);
    }
}
