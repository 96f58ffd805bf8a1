//! Model serving
//!
//! - [`ModelLoader`] / [`FsModelLoader`]: where models come from
//! - [`ModelCache`]: load-once-per-id cache with an eviction policy
//! - [`PredictionService`]: record coercion, optional log transform, inference

mod cache;
mod loader;
mod prediction;

pub use cache::{CacheStats, EvictionPolicy, ModelCache};
pub use loader::{is_valid_model_id, FsModelLoader, ModelLoader, MODEL_FILE_NAME};
pub use prediction::{PredictionOutcome, PredictionService};
