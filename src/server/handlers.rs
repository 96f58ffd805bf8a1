//! HTTP request handlers

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::data::{frame_to_records, read_csv};
use crate::error::CrashcastError;
use crate::serving::{is_valid_model_id, ModelLoader, PredictionOutcome};
use crate::training::CrashRegressor;

use super::error::{Result, ServerError};
use super::state::AppState;

// ============================================================================
// Prediction Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictSingleRequest {
    model_id: String,
    inputs: Map<String, Value>,
    #[serde(default)]
    log_transform: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictBatchRequest {
    model_id: String,
    predictions: Vec<Map<String, Value>>,
    #[serde(default = "default_true")]
    apply_log_transform: bool,
}

fn default_true() -> bool {
    true
}

fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ServerError::BadRequest(e.body_text()))
}

pub async fn predict_single(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<PredictSingleRequest>, JsonRejection>,
) -> Result<Json<PredictionOutcome>> {
    let request = json_body(payload)?;
    let predictor = state.predictor.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        predictor.predict_single(&request.model_id, request.inputs, request.log_transform)
    })
    .await
    .map_err(|e| ServerError::Internal(format!("Prediction task failed: {}", e)))??;

    Ok(Json(outcome))
}

pub async fn predict_batch(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<PredictBatchRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    let request = json_body(payload)?;
    let predictor = state.predictor.clone();

    let results = tokio::task::spawn_blocking(move || {
        predictor.predict_batch(&request.model_id, request.predictions, request.apply_log_transform)
    })
    .await
    .map_err(|e| ServerError::Internal(format!("Prediction task failed: {}", e)))??;

    Ok(Json(json!({ "results": results })))
}

/// Batch prediction over an uploaded CSV, one record per row
pub async fn predict_csv(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<Value>> {
    let mut fields = read_fields(multipart).await?;
    let file = file_field(&mut fields, &["file", "csv"])?;
    let model_id = model_id_field(&fields)?.ok_or_else(|| missing("modelId"))?;
    let log_transform = match text_field(&fields, "logTransform")? {
        Some(flag) if flag.eq_ignore_ascii_case("true") => true,
        Some(flag) if flag.eq_ignore_ascii_case("false") => false,
        Some(flag) => {
            return Err(ServerError::BadRequest(format!(
                "'logTransform' must be true or false, got '{}'",
                flag
            )))
        }
        None => return Err(missing("logTransform")),
    };

    let df = read_csv(&file).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    if df.height() == 0 {
        return Err(ServerError::BadRequest("CSV file has no rows".to_string()));
    }
    let records = frame_to_records(&df).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    debug!(model_id = %model_id, rows = records.len(), log_transform, "CSV prediction requested");

    let predictor = state.predictor.clone();
    let results = tokio::task::spawn_blocking(move || predictor.predict_batch(&model_id, records, log_transform))
        .await
        .map_err(|e| ServerError::Internal(format!("Prediction task failed: {}", e)))??;

    Ok(Json(json!({ "results": results })))
}

// ============================================================================
// Multipart Forms
// ============================================================================

/// Collect every multipart field by name. Later duplicates win.
async fn read_fields(mut multipart: Multipart) -> Result<HashMap<String, Bytes>> {
    let mut fields = HashMap::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|e| ServerError::BadRequest(e.to_string()))?;
        fields.insert(name, bytes);
    }
    Ok(fields)
}

fn missing(field: &str) -> ServerError {
    ServerError::BadRequest(format!("missing form field '{}'", field))
}

fn text_field(fields: &HashMap<String, Bytes>, name: &str) -> Result<Option<String>> {
    fields
        .get(name)
        .map(|bytes| {
            std::str::from_utf8(bytes)
                .map(|s| s.trim().to_string())
                .map_err(|_| ServerError::BadRequest(format!("'{}' must be UTF-8 text", name)))
        })
        .transpose()
}

fn count_field(fields: &HashMap<String, Bytes>, name: &str) -> Result<usize> {
    let text = text_field(fields, name)?.ok_or_else(|| missing(name))?;
    text.parse()
        .map_err(|_| ServerError::BadRequest(format!("'{}' must be a non-negative integer, got '{}'", name, text)))
}

fn model_id_field(fields: &HashMap<String, Bytes>) -> Result<Option<String>> {
    match text_field(fields, "modelId")? {
        Some(id) if !is_valid_model_id(&id) => Err(ServerError::BadRequest(format!("invalid modelId '{}'", id))),
        other => Ok(other),
    }
}

/// First present field among `names`, for forms that accept an alias.
fn file_field(fields: &mut HashMap<String, Bytes>, names: &[&str]) -> Result<Bytes> {
    names
        .iter()
        .find_map(|name| fields.remove(*name))
        .ok_or_else(|| missing(names[0]))
}

// ============================================================================
// Training Handlers
// ============================================================================

/// Parsed `/train_model` form
struct TrainForm {
    file: Bytes,
    epochs: usize,
    kfolds: usize,
    model_id: Option<String>,
}

async fn read_train_form(multipart: Multipart) -> Result<TrainForm> {
    let mut fields = read_fields(multipart).await?;
    for name in fields.keys() {
        if !matches!(name.as_str(), "file" | "epochs" | "kfolds" | "modelId") {
            debug!(field = %name, "Ignoring unknown form field");
        }
    }

    let file = file_field(&mut fields, &["file"])?;
    Ok(TrainForm {
        file,
        epochs: count_field(&fields, "epochs")?,
        kfolds: count_field(&fields, "kfolds")?,
        model_id: model_id_field(&fields)?,
    })
}

/// Cross-validate on an uploaded CSV and persist the final model
///
/// The artifact and the published copy are only written once training has
/// succeeded and both destinations are staged.
pub async fn train_model(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<Value>> {
    let form = read_train_form(multipart).await?;
    info!(
        bytes = form.file.len(),
        epochs = form.epochs,
        kfolds = form.kfolds,
        model_id = ?form.model_id,
        "Training requested"
    );

    let _running = state.training_lock.lock().await;

    let publish_to = form
        .model_id
        .as_deref()
        .map(|id| state.loader.publish_path(id))
        .transpose()
        .map_err(|e| ServerError::BadRequest(e.to_string()))?;

    let trainer = state.trainer.clone();
    let report = tokio::task::spawn_blocking(move || {
        let outcome = trainer.train_csv(&form.file, form.epochs, form.kfolds)?;
        let copies: Vec<&std::path::Path> = publish_to.iter().map(|p| p.as_path()).collect();
        trainer.persist(&outcome.model, &copies)?;
        Ok::<_, CrashcastError>(outcome.report)
    })
    .await
    .map_err(|e| ServerError::Internal(format!("Training task failed: {}", e)))?
    .map_err(|e| ServerError::Training(e.to_string()))?;

    // A republished id must not keep serving the previous model.
    if let Some(id) = &form.model_id {
        state.cache.evict(id);
        info!(model_id = %id, "Published trained model");
    }

    Ok(Json(json!({
        "results": report.aggregate,
        "folds": report.folds,
        "modelId": form.model_id,
    })))
}

/// Stream the most recently trained artifact
pub async fn download_model(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    let path = &state.config.artifact_path;
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ServerError::NotFound("Model file not found".to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("model.json");
    let disposition = format!("attachment; filename=\"{}\"", file_name);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (
                header::CONTENT_DISPOSITION,
                HeaderValue::from_str(&disposition)
                    .map_err(|e| ServerError::Internal(format!("Invalid header: {}", e)))?,
            ),
        ],
        bytes,
    ))
}

// ============================================================================
// Model Handlers
// ============================================================================

pub async fn list_models(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let ids = state.loader.list()?;
    let models: Vec<Value> = ids
        .into_iter()
        .map(|id| {
            let cached = state.cache.contains(&id);
            json!({ "id": id, "cached": cached })
        })
        .collect();

    Ok(Json(json!({ "models": models })))
}

/// Store an uploaded model artifact under `model_id`
pub async fn upload_model(
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
    multipart: Multipart,
) -> Result<Json<Value>> {
    if !is_valid_model_id(&model_id) {
        return Err(ServerError::BadRequest(format!("invalid model id '{}'", model_id)));
    }
    let mut fields = read_fields(multipart).await?;
    let file = file_field(&mut fields, &["file", "modelFile"])?;

    let model = CrashRegressor::from_slice(&file)
        .map_err(|e| ServerError::BadRequest(format!("Invalid model artifact: {}", e)))?;
    let target = state
        .loader
        .publish_path(&model_id)
        .map_err(|e| ServerError::BadRequest(e.to_string()))?;

    let features = model.feature_names().to_vec();
    let path = tokio::task::spawn_blocking(move || model.save(&target).map(|_| target))
        .await
        .map_err(|e| ServerError::Internal(format!("Upload task failed: {}", e)))??;

    state.cache.evict(&model_id);
    info!(model_id = %model_id, path = %path.display(), "Stored uploaded model");

    Ok(Json(json!({
        "modelId": model_id,
        "features": features,
    })))
}

/// Delete a stored model and drop it from the cache
pub async fn delete_model(
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
) -> Result<Json<Value>> {
    state.loader.remove(&model_id)?;
    let evicted = state.cache.evict(&model_id);

    Ok(Json(json!({
        "modelId": model_id,
        "deleted": true,
        "evicted": evicted,
    })))
}

pub async fn evict_model_cache(
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
) -> Json<Value> {
    let evicted = state.cache.evict(&model_id);
    Json(json!({
        "modelId": model_id,
        "evicted": evicted,
    }))
}

// ============================================================================
// System Handlers
// ============================================================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let uptime = chrono::Utc::now().signed_duration_since(state.started_at);
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": uptime.num_seconds(),
        "artifact_available": state.config.artifact_path.is_file(),
        "cache": state.cache.stats(),
    }))
}
