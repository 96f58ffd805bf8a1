//! Model training module
//!
//! Provides the crash-count regressor and everything needed to train it:
//! - Dense network with a built-in normalization stage
//! - Seeded k-fold splitting
//! - Fold and aggregate regression metrics
//! - The cross-validated training pipeline that persists the final model

mod builder;
mod trainer;
pub mod cross_validation;
pub mod metrics;
pub mod neural_network;

pub use builder::build_and_compile;
pub use cross_validation::{CVSplit, KFold};
pub use metrics::{round_to, AggregateMetrics, FoldMetrics, REPORT_DECIMALS};
pub use neural_network::{Activation, CrashRegressor, EpochRecord, StagedArtifact, TrainingHistory};
pub use trainer::{CrossValidationTrainer, FoldReport, TrainingOutcome, TrainingReport};
