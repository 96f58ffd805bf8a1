//! K-fold cross-validated training
//!
//! CSV -> drop incomplete rows -> seeded k-fold split -> per fold: log
//! transform, pop label, fit, score -> aggregate -> persist the final model.
//! Nothing is written unless every fold succeeds, and every destination is
//! staged before any of them is replaced.

use std::path::{Path, PathBuf};
use std::time::Instant;

use ndarray::{Array1, Array2};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{FoldModelPolicy, ModelConfig, PipelineConfig};
use crate::data::{read_csv, Dataset};
use crate::error::{CrashcastError, Result};
use crate::preprocessing::{FeatureTransformer, Normalization};

use super::builder::build_and_compile;
use super::cross_validation::KFold;
use super::metrics::{AggregateMetrics, FoldMetrics};
use super::neural_network::CrashRegressor;

/// Scores and fit summary for one fold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldReport {
    /// 1-based fold number
    pub fold: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub metrics: FoldMetrics,
    pub final_loss: Option<f64>,
    pub final_val_loss: Option<f64>,
}

/// Result of a full cross-validation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub aggregate: AggregateMetrics,
    pub folds: Vec<FoldReport>,
    pub rows_used: usize,
    pub rows_dropped: usize,
    pub policy: FoldModelPolicy,
    pub epochs: usize,
    pub training_time_secs: f64,
}

/// Report plus the model that was persisted
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub report: TrainingReport,
    pub model: CrashRegressor,
}

/// Runs k-fold training and writes the final model to a fixed location.
#[derive(Debug, Clone)]
pub struct CrossValidationTrainer {
    pipeline: PipelineConfig,
    model: ModelConfig,
    policy: FoldModelPolicy,
    artifact_path: PathBuf,
}

impl CrossValidationTrainer {
    pub fn new(pipeline: PipelineConfig, model: ModelConfig, artifact_path: impl Into<PathBuf>) -> Self {
        Self {
            pipeline,
            model,
            policy: FoldModelPolicy::default(),
            artifact_path: artifact_path.into(),
        }
    }

    pub fn with_policy(mut self, policy: FoldModelPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn pipeline(&self) -> &PipelineConfig {
        &self.pipeline
    }

    pub fn policy(&self) -> FoldModelPolicy {
        self.policy
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    /// Parse CSV bytes, train and persist the final model.
    pub fn run_csv(&self, bytes: &[u8], epochs: usize, k_folds: usize) -> Result<TrainingOutcome> {
        let df = read_csv(bytes)?;
        self.run(&df, epochs, k_folds)
    }

    /// Train on a DataFrame and persist the final model.
    pub fn run(&self, df: &DataFrame, epochs: usize, k_folds: usize) -> Result<TrainingOutcome> {
        let outcome = self.train(df, epochs, k_folds)?;
        self.persist(&outcome.model, &[])?;
        Ok(outcome)
    }

    /// Parse CSV bytes and train without writing anything.
    pub fn train_csv(&self, bytes: &[u8], epochs: usize, k_folds: usize) -> Result<TrainingOutcome> {
        let df = read_csv(bytes)?;
        self.train(&df, epochs, k_folds)
    }

    /// Write `model` to the artifact path and to every path in `copies`.
    ///
    /// All files are staged first; if any staging fails the existing files
    /// are left untouched.
    pub fn persist(&self, model: &CrashRegressor, copies: &[&Path]) -> Result<()> {
        let mut staged = vec![model.stage(&self.artifact_path)?];
        for path in copies {
            staged.push(model.stage(path)?);
        }
        for artifact in staged {
            let path = artifact.commit()?;
            info!(path = %path.display(), "Saved trained model");
        }
        Ok(())
    }

    /// Cross-validate on a DataFrame and return the final model unsaved.
    pub fn train(&self, df: &DataFrame, epochs: usize, k_folds: usize) -> Result<TrainingOutcome> {
        let start = Instant::now();

        let (dataset, rows_dropped) = Dataset::from_frame_dropping_missing(df)?;
        if rows_dropped > 0 {
            warn!(rows_dropped, rows_kept = dataset.n_rows(), "Dropped rows with missing values");
        }

        let (model, folds) = self.cross_validate(&dataset, epochs, k_folds)?;
        let fold_metrics: Vec<FoldMetrics> = folds.iter().map(|f| f.metrics).collect();
        let aggregate = AggregateMetrics::from_folds(&fold_metrics)?;

        info!(
            avg_mse = aggregate.mse,
            avg_mae = aggregate.mae,
            avg_r2 = aggregate.r2,
            "Cross-validation complete"
        );

        let report = TrainingReport {
            aggregate,
            folds,
            rows_used: dataset.n_rows(),
            rows_dropped,
            policy: self.policy,
            epochs,
            training_time_secs: start.elapsed().as_secs_f64(),
        };

        Ok(TrainingOutcome { report, model })
    }

    /// Fit and score every fold without persisting anything.
    pub fn cross_validate(
        &self,
        dataset: &Dataset,
        epochs: usize,
        k_folds: usize,
    ) -> Result<(CrashRegressor, Vec<FoldReport>)> {
        if epochs == 0 {
            return Err(CrashcastError::Validation("epochs must be at least 1".to_string()));
        }

        let transformer = FeatureTransformer::from_config(&self.pipeline);
        let splits = KFold::new(k_folds)
            .with_random_state(self.pipeline.seed)
            .split(dataset.n_rows())?;

        let mut current: Option<CrashRegressor> = None;
        let mut reports = Vec::with_capacity(splits.len());

        for split in &splits {
            let fold = split.fold_idx + 1;
            let train = dataset.select_rows(&split.train_indices);
            let test = dataset.select_rows(&split.test_indices);

            let (feature_names, x_train, y_train) = self.prepare(&transformer, &train)?;
            let (_, x_test, y_test) = self.prepare(&transformer, &test)?;

            let mut model = match (self.policy, current.take()) {
                (FoldModelPolicy::Carryover, Some(existing)) => existing,
                _ => {
                    let normalization = Normalization::adapt(&x_train)?;
                    build_and_compile(normalization, feature_names, &self.model)?
                }
            };

            let history = model.fit(&x_train, &y_train, epochs)?;
            let metrics = model.evaluate(&x_test, &y_test)?;

            info!(
                fold,
                k = k_folds,
                train_rows = x_train.nrows(),
                test_rows = x_test.nrows(),
                mse = metrics.mse,
                mae = metrics.mae,
                r2 = metrics.r2,
                "Fold scored"
            );

            reports.push(FoldReport {
                fold,
                train_rows: x_train.nrows(),
                test_rows: x_test.nrows(),
                metrics,
                final_loss: history.last().map(|e| e.loss),
                final_val_loss: history.last().and_then(|e| e.val_loss),
            });
            current = Some(model);
        }

        let model = current.ok_or_else(|| CrashcastError::Training("no folds were trained".to_string()))?;
        Ok((model, reports))
    }

    /// Log-transform a partition, split off the label and reject values the
    /// network cannot train on.
    fn prepare(
        &self,
        transformer: &FeatureTransformer,
        partition: &Dataset,
    ) -> Result<(Vec<String>, Array2<f64>, Array1<f64>)> {
        let (features, labels) = transformer.transform_with_label(partition, &self.pipeline.label_column)?;

        if features.n_columns() == 0 {
            return Err(CrashcastError::Data("no feature columns besides the label".to_string()));
        }
        for (idx, name) in features.columns().iter().enumerate() {
            if features.values().column(idx).iter().any(|v| !v.is_finite()) {
                return Err(CrashcastError::Data(format!(
                    "column '{}' has non-finite values; log inputs must exceed -{}",
                    name, self.pipeline.epsilon
                )));
            }
        }
        if labels.iter().any(|v| !v.is_finite()) {
            return Err(CrashcastError::Data(format!(
                "label column '{}' has non-finite values",
                self.pipeline.label_column
            )));
        }

        let (names, values) = features.into_parts();
        Ok((names, values, labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn crash_frame(n: usize) -> DataFrame {
        let length: Vec<f64> = (0..n).map(|i| 0.5 + (i % 7) as f64 * 0.3).collect();
        let adt: Vec<f64> = (0..n).map(|i| 500.0 + (i * 37 % 100) as f64 * 40.0).collect();
        let crashes: Vec<f64> = length
            .iter()
            .zip(&adt)
            .map(|(l, a)| (l * a / 1000.0).round())
            .collect();
        df!("Length" => length, "ADT" => adt, "Crashes" => crashes).unwrap()
    }

    fn trainer(dir: &Path) -> CrossValidationTrainer {
        CrossValidationTrainer::new(
            PipelineConfig::default(),
            ModelConfig::default().with_hidden_layers(vec![8, 8]),
            dir.join("model.json"),
        )
    }

    #[test]
    fn test_run_persists_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(dir.path());

        let outcome = trainer.run(&crash_frame(40), 2, 4).unwrap();
        assert_eq!(outcome.report.folds.len(), 4);
        assert_eq!(outcome.report.rows_used, 40);
        assert_eq!(outcome.report.rows_dropped, 0);
        assert!(trainer.artifact_path().exists());

        let test_rows: usize = outcome.report.folds.iter().map(|f| f.test_rows).sum();
        assert_eq!(test_rows, 40);
        assert_eq!(outcome.model.feature_names(), &["Log Length", "Log ADT"]);
    }

    #[test]
    fn test_carryover_continues_training() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(dir.path()).with_policy(FoldModelPolicy::Carryover);

        let outcome = trainer.run(&crash_frame(30), 2, 3).unwrap();
        assert_eq!(outcome.model.epochs_trained(), 6);

        let fresh = self::trainer(dir.path()).run(&crash_frame(30), 2, 3).unwrap();
        assert_eq!(fresh.model.epochs_trained(), 2);
    }

    #[test]
    fn test_missing_label_fails_without_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(dir.path());
        let df = df!("Length" => &[1.0, 2.0, 3.0], "ADT" => &[1.0, 2.0, 3.0]).unwrap();

        let result = trainer.run(&df, 1, 2);
        assert!(matches!(result, Err(CrashcastError::FeatureNotFound(_))));
        assert!(!trainer.artifact_path().exists());
    }

    #[test]
    fn test_negative_log_input_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(dir.path());
        let df = df!(
            "Length" => &[1.0, -2.0, 3.0, 4.0],
            "ADT" => &[1.0, 2.0, 3.0, 4.0],
            "Crashes" => &[1.0, 2.0, 3.0, 4.0]
        )
        .unwrap();

        match trainer.run(&df, 1, 2) {
            Err(CrashcastError::Data(msg)) => assert!(msg.contains("Log Length")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_train_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(dir.path());

        let outcome = trainer.train(&crash_frame(20), 1, 2).unwrap();
        assert_eq!(outcome.report.folds.len(), 2);
        assert!(!trainer.artifact_path().exists());
    }

    #[test]
    fn test_persist_stages_every_copy_first() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(dir.path());
        let outcome = trainer.train(&crash_frame(20), 1, 2).unwrap();

        // A directory in the way makes the copy unstageable.
        let blocked = dir.path().join("blocked");
        std::fs::create_dir(&blocked).unwrap();
        assert!(trainer.persist(&outcome.model, &[blocked.as_path()]).is_err());
        assert!(!trainer.artifact_path().exists());

        let copy = dir.path().join("copies").join("model.json");
        trainer.persist(&outcome.model, &[copy.as_path()]).unwrap();
        assert!(trainer.artifact_path().exists());
        assert!(CrashRegressor::load(&copy).is_ok());
    }

    #[test]
    fn test_zero_epochs_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            trainer(dir.path()).run(&crash_frame(10), 0, 2),
            Err(CrashcastError::Validation(_))
        ));
    }
}
