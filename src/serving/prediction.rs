//! Prediction service

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::data::Dataset;
use crate::error::{CrashcastError, Result};
use crate::preprocessing::log_transform_all;
use crate::training::CrashRegressor;

use super::cache::ModelCache;

/// One input record paired with its prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionOutcome {
    pub inputs: Map<String, Value>,
    pub result: f64,
}

/// Turns JSON records into predictions from cached models.
///
/// Record values are coerced leniently (anything non-numeric becomes 0).
/// The optional log transform covers every column present in the request,
/// not the fixed training list.
#[derive(Debug, Clone)]
pub struct PredictionService {
    cache: Arc<ModelCache>,
    epsilon: f64,
}

impl PredictionService {
    pub fn new(cache: Arc<ModelCache>, epsilon: f64) -> Self {
        Self { cache, epsilon }
    }

    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    pub fn predict_single(
        &self,
        model_id: &str,
        inputs: Map<String, Value>,
        log_transform: bool,
    ) -> Result<PredictionOutcome> {
        self.predict_batch(model_id, vec![inputs], log_transform)?
            .pop()
            .ok_or_else(|| CrashcastError::Prediction("model returned no prediction".to_string()))
    }

    /// Predict every record; output order matches input order.
    pub fn predict_batch(
        &self,
        model_id: &str,
        records: Vec<Map<String, Value>>,
        log_transform: bool,
    ) -> Result<Vec<PredictionOutcome>> {
        let model = self.cache.get_or_load(model_id).map_err(CrashcastError::into_prediction)?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let predictions = self
            .infer(&model, &records, log_transform)
            .map_err(CrashcastError::into_prediction)?;
        debug!(model_id, n_records = records.len(), log_transform, "Predictions served");

        Ok(records
            .into_iter()
            .zip(predictions)
            .map(|(inputs, result)| PredictionOutcome { inputs, result })
            .collect())
    }

    fn infer(&self, model: &CrashRegressor, records: &[Map<String, Value>], log_transform: bool) -> Result<Vec<f64>> {
        let mut dataset = Dataset::from_records(records);
        if log_transform {
            log_transform_all(&mut dataset, self.epsilon);
        }

        if dataset.n_columns() != model.n_features() {
            return Err(CrashcastError::Prediction(format!(
                "model expects {} features ({}), got {} ({})",
                model.n_features(),
                model.feature_names().join(", "),
                dataset.n_columns(),
                dataset.columns().join(", ")
            )));
        }

        if let Some(((row, col), _)) = dataset.values().indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(CrashcastError::Prediction(format!(
                "record {} has a non-finite value for '{}'; log inputs must exceed -{}",
                row,
                dataset.columns()[col],
                self.epsilon
            )));
        }

        let predictions = model.predict(dataset.values())?;
        if let Some(row) = predictions.iter().position(|p| !p.is_finite()) {
            return Err(CrashcastError::Prediction(format!(
                "record {} produced a non-finite prediction",
                row
            )));
        }
        Ok(predictions.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelConfig, DEFAULT_EPSILON};
    use crate::preprocessing::Normalization;
    use crate::serving::{EvictionPolicy, FsModelLoader};
    use crate::training::build_and_compile;
    use ndarray::array;
    use serde_json::json;

    fn service(dir: &std::path::Path) -> PredictionService {
        let loader = FsModelLoader::new(dir);
        let norm = Normalization::adapt(&array![[0.0, 5.0], [1.0, 8.0], [2.0, 9.0]]).unwrap();
        let config = ModelConfig::default().with_hidden_layers(vec![4, 4]);
        let model = build_and_compile(norm, vec!["Log Length".into(), "Log ADT".into()], &config).unwrap();
        loader.publish("m", &model).unwrap();

        let cache = Arc::new(ModelCache::new(Arc::new(loader), EvictionPolicy::Unbounded));
        PredictionService::new(cache, DEFAULT_EPSILON)
    }

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_batch_keeps_order_and_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let records: Vec<_> = (1..=5)
            .map(|i| record(json!({"Length": i as f64, "ADT": 1000.0 * i as f64})))
            .collect();

        let outcomes = service.predict_batch("m", records.clone(), true).unwrap();
        assert_eq!(outcomes.len(), 5);
        for (outcome, input) in outcomes.iter().zip(&records) {
            assert_eq!(&outcome.inputs, input);
            assert!(outcome.result.is_finite());
        }
    }

    #[test]
    fn test_single_matches_batch() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let input = record(json!({"Length": 2.5, "ADT": 4000}));

        let single = service.predict_single("m", input.clone(), true).unwrap();
        let batch = service.predict_batch("m", vec![input], true).unwrap();
        assert_eq!(single, batch[0]);
    }

    #[test]
    fn test_non_numeric_coerced_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let coerced = service
            .predict_single("m", record(json!({"Length": 1.0, "ADT": "abc"})), false)
            .unwrap();
        let zero = service
            .predict_single("m", record(json!({"Length": 1.0, "ADT": 0.0})), false)
            .unwrap();
        assert_eq!(coerced.result, zero.result);
        assert_eq!(coerced.inputs["ADT"], json!("abc"));
    }

    #[test]
    fn test_unknown_model_and_empty_batch() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        assert!(matches!(
            service.predict_batch("nope", vec![], true),
            Err(CrashcastError::NotFound(_))
        ));
        assert!(service.predict_batch("m", vec![], true).unwrap().is_empty());
    }

    #[test]
    fn test_feature_count_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let result = service.predict_single("m", record(json!({"Length": 1.0})), false);
        assert!(matches!(result, Err(CrashcastError::Prediction(_))));
    }

    #[test]
    fn test_negative_log_input_is_prediction_error() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let result = service.predict_single("m", record(json!({"Length": -5.0, "ADT": 100.0})), true);
        assert!(matches!(result, Err(CrashcastError::Prediction(_))));
    }
}
