//! Crashcast Server Module
//!
//! HTTP boundary for training the crash regressor and serving predictions
//! from cached models.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use state::AppState;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::{FoldModelPolicy, ModelConfig, PipelineConfig};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Root of the per-id model directories
    pub models_dir: PathBuf,
    /// Fixed location of the most recently trained model
    pub artifact_path: PathBuf,
    pub max_upload_size: usize,
    /// `None` keeps every loaded model
    pub cache_capacity: Option<usize>,
    pub cors_origin: Option<String>,
    pub pipeline: PipelineConfig,
    pub model: ModelConfig,
    pub fold_policy: FoldModelPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            models_dir: std::env::var("MODELS_DIR")
                .unwrap_or_else(|_| "./models".to_string())
                .into(),
            artifact_path: std::env::var("ARTIFACT_PATH")
                .unwrap_or_else(|_| "./crash_prediction_dnn_model.json".to_string())
                .into(),
            max_upload_size: std::env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100 * 1024 * 1024), // 100MB
            cache_capacity: std::env::var("MODEL_CACHE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok()),
            cors_origin: std::env::var("CORS_ORIGIN").ok().filter(|o| !o.is_empty()),
            pipeline: PipelineConfig::from_env(),
            model: ModelConfig::default(),
            fold_policy: FoldModelPolicy::from_env(),
        }
    }
}

impl ServerConfig {
    /// Defaults with storage rooted at the given locations.
    pub fn with_storage(models_dir: impl Into<PathBuf>, artifact_path: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
            artifact_path: artifact_path.into(),
            ..Default::default()
        }
    }
}

/// Start the server with the given configuration
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();
    info!(
        models_dir = %config.models_dir.display(),
        artifact_path = %config.artifact_path.display(),
        fold_policy = ?config.fold_policy,
        cache_capacity = ?config.cache_capacity,
        "Initializing server"
    );

    std::fs::create_dir_all(&config.models_dir)?;

    let state = Arc::new(AppState::new(config.clone()));
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(
        address = %addr,
        max_upload_size_mb = config.max_upload_size / 1024 / 1024,
        started_at = %start_time.to_rfc3339(),
        "Crashcast server starting"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, pid = std::process::id(), "Server listening");

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install ctrl+c handler");
            std::future::pending::<()>().await;
        }
        let uptime = chrono::Utc::now().signed_duration_since(start_time);
        info!(uptime_secs = uptime.num_seconds(), "Shutdown signal received, stopping server");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config() {
        let config = ServerConfig::with_storage("/tmp/m", "/tmp/a.json");
        assert_eq!(config.models_dir, PathBuf::from("/tmp/m"));
        assert_eq!(config.artifact_path, PathBuf::from("/tmp/a.json"));
        assert!(config.max_upload_size > 0);
    }
}
