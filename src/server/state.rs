//! Application state management

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::serving::{EvictionPolicy, FsModelLoader, ModelCache, PredictionService};
use crate::training::CrossValidationTrainer;

use super::ServerConfig;

/// Application state shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    pub loader: Arc<FsModelLoader>,
    pub cache: Arc<ModelCache>,
    pub predictor: PredictionService,
    pub trainer: CrossValidationTrainer,
    /// Held for the whole of a training run so artifact writes never interleave
    pub training_lock: Mutex<()>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let loader = Arc::new(FsModelLoader::new(&config.models_dir));
        let cache = Arc::new(ModelCache::new(
            loader.clone(),
            EvictionPolicy::from_capacity(config.cache_capacity),
        ));
        let predictor = PredictionService::new(Arc::clone(&cache), config.pipeline.epsilon);
        let trainer = CrossValidationTrainer::new(
            config.pipeline.clone(),
            config.model.clone(),
            &config.artifact_path,
        )
        .with_policy(config.fold_policy);

        Self {
            config,
            loader,
            cache,
            predictor,
            trainer,
            training_lock: Mutex::new(()),
            started_at: Utc::now(),
        }
    }
}
