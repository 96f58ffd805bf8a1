//! Crashcast - road crash count regression
//!
//! Trains a small dense network on road segment data with k-fold
//! cross-validation and serves predictions over HTTP.
//!
//! # Modules
//!
//! - [`data`] - CSV ingestion and the column-named `Dataset`
//! - [`preprocessing`] - log transforms and the normalization stage
//! - [`training`] - network, k-fold splitting, metrics, the training pipeline
//! - [`serving`] - model loading, the model cache, prediction
//! - [`server`] - HTTP API
//! - [`cli`] - command-line interface
//!
//! # Example
//!
//! ```no_run
//! use crashcast::prelude::*;
//!
//! let trainer = CrossValidationTrainer::new(
//!     PipelineConfig::default(),
//!     ModelConfig::default(),
//!     "crash_prediction_dnn_model.json",
//! );
//! let df = crashcast::data::read_csv_file("roads.csv")?;
//! let outcome = trainer.run(&df, 9, 5)?;
//! println!("{:?}", outcome.report.aggregate);
//! # Ok::<(), crashcast::error::CrashcastError>(())
//! ```

pub mod error;
pub mod config;

pub mod data;
pub mod preprocessing;
pub mod training;
pub mod serving;

pub mod server;
pub mod cli;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{FoldModelPolicy, ModelConfig, PipelineConfig};
    pub use crate::data::Dataset;
    pub use crate::error::{CrashcastError, Result};
    pub use crate::preprocessing::{FeatureTransformer, Normalization};
    pub use crate::serving::{EvictionPolicy, FsModelLoader, ModelCache, ModelLoader, PredictionService};
    pub use crate::training::{
        build_and_compile, AggregateMetrics, CrashRegressor, CrossValidationTrainer, FoldMetrics, KFold,
    };
}
