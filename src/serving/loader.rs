//! Model storage

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{CrashcastError, Result};
use crate::training::CrashRegressor;

/// File name of the serialized model inside a model directory
pub const MODEL_FILE_NAME: &str = "model.json";

/// Source of models for the cache.
pub trait ModelLoader: Send + Sync {
    /// Load the model stored under `model_id`, or fail with `NotFound`.
    fn load(&self, model_id: &str) -> Result<CrashRegressor>;

    /// Ids this loader can serve.
    fn list(&self) -> Result<Vec<String>>;
}

/// Loads models from `{root}/{model_id}/model.json`.
///
/// A plain file at `{root}/{model_id}` is accepted as well, so an artifact
/// copied into the models root can be served without wrapping it.
#[derive(Debug, Clone)]
pub struct FsModelLoader {
    root: PathBuf,
}

impl FsModelLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the stored model for `model_id`, if it exists.
    pub fn resolve(&self, model_id: &str) -> Result<PathBuf> {
        let entry = self.entry_path(model_id)?;
        if entry.is_dir() {
            let file = entry.join(MODEL_FILE_NAME);
            if file.is_file() {
                return Ok(file);
            }
        } else if entry.is_file() {
            return Ok(entry);
        }
        Err(CrashcastError::NotFound(format!("Model {} not found", model_id)))
    }

    /// Where `publish` would write `model_id`, checked before anything is trained.
    ///
    /// An id already taken by a plain model file cannot be republished as a
    /// directory; delete it first.
    pub fn publish_path(&self, model_id: &str) -> Result<PathBuf> {
        let entry = self.entry_path(model_id)?;
        if entry.is_file() {
            return Err(CrashcastError::Validation(format!(
                "model id '{}' is held by a plain model file; delete it before publishing",
                model_id
            )));
        }
        Ok(entry.join(MODEL_FILE_NAME))
    }

    /// Write `model` as `{root}/{model_id}/model.json`, replacing any previous one.
    pub fn publish(&self, model_id: &str, model: &CrashRegressor) -> Result<PathBuf> {
        let path = self.publish_path(model_id)?;
        model.save(&path)?;
        Ok(path)
    }

    /// Delete the stored model for `model_id`, directory or plain file.
    pub fn remove(&self, model_id: &str) -> Result<PathBuf> {
        let entry = self.entry_path(model_id)?;
        if entry.is_dir() {
            std::fs::remove_dir_all(&entry)?;
        } else if entry.is_file() {
            std::fs::remove_file(&entry)?;
        } else {
            return Err(CrashcastError::NotFound(format!("Model {} not found", model_id)));
        }
        info!(model_id, path = %entry.display(), "Removed stored model");
        Ok(entry)
    }

    fn entry_path(&self, model_id: &str) -> Result<PathBuf> {
        if !is_valid_model_id(model_id) {
            return Err(CrashcastError::NotFound(format!("Model {} not found", model_id)));
        }
        Ok(self.root.join(model_id))
    }
}

impl ModelLoader for FsModelLoader {
    fn load(&self, model_id: &str) -> Result<CrashRegressor> {
        let path = self.resolve(model_id)?;
        debug!(model_id, path = %path.display(), "Loading model from disk");
        CrashRegressor::load(&path)
    }

    fn list(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if is_valid_model_id(&name) && self.resolve(&name).is_ok() {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Model ids are single, non-traversing path components.
pub fn is_valid_model_id(model_id: &str) -> bool {
    !model_id.is_empty()
        && model_id != "."
        && !model_id.contains("..")
        && !model_id.contains('/')
        && !model_id.contains('\\')
}
