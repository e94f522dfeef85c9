//! Navigation pattern learning.
//!
//! # Data Flow
//! ```text
//! record_navigation(from, to)
//!     → edge frequency++ / last_used = now
//!     → keep top edges per source
//!     → persist table (immediately or debounced) via KeyValueStore
//!
//! predict_next(route)
//!     → edges used within the window → score by frequency and age → top N
//! ```

pub mod predictor;
pub mod store;

pub use predictor::{Edge, NavigationPredictor, Prediction};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
