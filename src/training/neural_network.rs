//! Feed-forward crash count regressor
//!
//! normalization -> dense(relu) x N -> dense(1). Trained with mean absolute
//! error and Adam. Optimizer moments and the step counter live on the model,
//! so a second `fit` call continues where the first one stopped.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ModelConfig;
use crate::error::{CrashcastError, Result};
use crate::preprocessing::Normalization;

use super::metrics::FoldMetrics;

/// Activation function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Activation {
    /// Rectified Linear Unit
    #[default]
    ReLU,
    /// Identity
    Linear,
}

impl Activation {
    fn apply(self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::ReLU => z.mapv(|v| v.max(0.0)),
            Activation::Linear => z.clone(),
        }
    }

    fn derivative(self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::ReLU => z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Linear => Array2::ones(z.raw_dim()),
        }
    }
}

/// Metrics for one pass over the training rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    /// Mean absolute error over training batches
    pub loss: f64,
    /// Mean squared error over training batches
    pub mse: f64,
    /// Mean absolute error on the held-out monitoring rows
    pub val_loss: Option<f64>,
}

/// Per-epoch history returned by [`CrashRegressor::fit`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochRecord>,
}

impl TrainingHistory {
    pub fn last(&self) -> Option<&EpochRecord> {
        self.epochs.last()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AdamState {
    pub(crate) step: u64,
    pub(crate) m_w: Vec<Array2<f64>>,
    pub(crate) v_w: Vec<Array2<f64>>,
    pub(crate) m_b: Vec<Array1<f64>>,
    pub(crate) v_b: Vec<Array1<f64>>,
}

impl AdamState {
    pub(crate) fn zeros_like(weights: &[Array2<f64>], biases: &[Array1<f64>]) -> Self {
        Self {
            step: 0,
            m_w: weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect(),
            v_w: weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect(),
            m_b: biases.iter().map(|b| Array1::zeros(b.len())).collect(),
            v_b: biases.iter().map(|b| Array1::zeros(b.len())).collect(),
        }
    }
}

/// Trained (or trainable) regression network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashRegressor {
    pub(crate) config: ModelConfig,
    pub(crate) feature_names: Vec<String>,
    pub(crate) normalization: Normalization,
    pub(crate) weights: Vec<Array2<f64>>,
    pub(crate) biases: Vec<Array1<f64>>,
    pub(crate) optimizer: AdamState,
    pub(crate) epochs_trained: usize,
    pub(crate) trained_at: Option<DateTime<Utc>>,
}

impl CrashRegressor {
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_features(&self) -> usize {
        self.normalization.n_features()
    }

    pub fn epochs_trained(&self) -> usize {
        self.epochs_trained
    }

    pub fn trained_at(&self) -> Option<DateTime<Utc>> {
        self.trained_at
    }

    /// Fit for `epochs` passes. The trailing `validation_split` fraction of
    /// rows is only used to report `val_loss`.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, epochs: usize) -> Result<TrainingHistory> {
        self.check_features(x)?;
        if x.nrows() != y.len() {
            return Err(CrashcastError::Shape {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(CrashcastError::Training("no training rows".to_string()));
        }

        let n_samples = x.nrows();
        let mut train_size = ((n_samples as f64) * (1.0 - self.config.validation_split)).floor() as usize;
        if train_size == 0 {
            train_size = n_samples;
        }

        let x_norm = self.normalization.apply(x);
        let x_train = x_norm.slice(ndarray::s![..train_size, ..]).to_owned();
        let y_train = y.slice(ndarray::s![..train_size]).to_owned();
        let x_val = x_norm.slice(ndarray::s![train_size.., ..]).to_owned();
        let y_val = y.slice(ndarray::s![train_size..]).to_owned();

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed.wrapping_add(self.optimizer.step)),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        let batch_size = self.config.batch_size.max(1);
        let mut history = TrainingHistory::default();

        for epoch in 0..epochs {
            let mut indices: Vec<usize> = (0..train_size).collect();
            indices.shuffle(&mut rng);

            let mut abs_sum = 0.0;
            let mut sq_sum = 0.0;

            for batch_indices in indices.chunks(batch_size) {
                let x_batch = x_train.select(Axis(0), batch_indices);
                let y_batch = y_train.select(Axis(0), batch_indices);

                let (activations, z_values) = self.forward(&x_batch);
                let output = activations
                    .last()
                    .map(|a| a.column(0).to_owned())
                    .unwrap_or_else(|| Array1::zeros(batch_indices.len()));

                for (p, t) in output.iter().zip(y_batch.iter()) {
                    abs_sum += (p - t).abs();
                    sq_sum += (p - t).powi(2);
                }

                let gradients = self.backward(&y_batch, &activations, &z_values);
                self.adam_step(gradients);
            }

            let loss = abs_sum / train_size as f64;
            let mse = sq_sum / train_size as f64;
            let val_loss = if y_val.is_empty() {
                None
            } else {
                let pred = self.predict_normalized(&x_val);
                Some(mean_absolute_error(&y_val, &pred))
            };

            debug!(epoch = epoch + 1, loss, mse, val_loss = ?val_loss, "epoch finished");
            history.epochs.push(EpochRecord { epoch: epoch + 1, loss, mse, val_loss });
        }

        self.epochs_trained += epochs;
        self.trained_at = Some(Utc::now());
        Ok(history)
    }

    /// Predict raw (un-normalized) feature rows.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.check_features(x)?;
        if x.nrows() == 0 {
            return Ok(Array1::zeros(0));
        }
        Ok(self.predict_normalized(&self.normalization.apply(x)))
    }

    /// Score held-out rows.
    pub fn evaluate(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<FoldMetrics> {
        let predictions = self.predict(x)?;
        FoldMetrics::compute(y, &predictions)
    }

    /// Persist as JSON, atomically replacing any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.stage(path)?.commit()?;
        Ok(())
    }

    /// Write the JSON to a temporary file beside `path` without touching `path`.
    ///
    /// Readers keep seeing the previous file until [`StagedArtifact::commit`].
    pub fn stage(&self, path: impl AsRef<Path>) -> Result<StagedArtifact> {
        let target = path.as_ref().to_path_buf();
        let parent = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if target.is_dir() {
            return Err(CrashcastError::Validation(format!(
                "cannot write model over directory {}",
                target.display()
            )));
        }
        std::fs::create_dir_all(&parent)?;

        let mut file = tempfile::NamedTempFile::new_in(&parent)?;
        serde_json::to_writer_pretty(&mut file, self)?;
        file.flush()?;
        file.as_file().sync_all()?;
        Ok(StagedArtifact { file, target })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read(path.as_ref())?;
        Self::from_slice(&json)
    }

    /// Parse and shape-check a serialized model.
    pub fn from_slice(json: &[u8]) -> Result<Self> {
        let model: Self = serde_json::from_slice(json)?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        if self.weights.is_empty() || self.weights.len() != self.biases.len() {
            return Err(CrashcastError::Serialization("model has no layers".to_string()));
        }
        if self.feature_names.len() != self.n_features() {
            return Err(CrashcastError::Serialization(format!(
                "model lists {} feature names for {} inputs",
                self.feature_names.len(),
                self.n_features()
            )));
        }
        let mut width = self.n_features();
        for (w, b) in self.weights.iter().zip(&self.biases) {
            if w.nrows() != width || w.ncols() != b.len() {
                return Err(CrashcastError::Serialization("layer shapes do not chain".to_string()));
            }
            width = w.ncols();
        }
        if width != 1 {
            return Err(CrashcastError::Serialization("output layer must have one unit".to_string()));
        }
        Ok(())
    }

    fn check_features(&self, x: &Array2<f64>) -> Result<()> {
        if x.ncols() != self.n_features() {
            return Err(CrashcastError::Shape {
                expected: format!("{} features", self.n_features()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(())
    }

    fn predict_normalized(&self, x: &Array2<f64>) -> Array1<f64> {
        let (activations, _) = self.forward(x);
        activations
            .last()
            .map(|a| a.column(0).to_owned())
            .unwrap_or_else(|| Array1::zeros(x.nrows()))
    }

    fn forward(&self, x: &Array2<f64>) -> (Vec<Array2<f64>>, Vec<Array2<f64>>) {
        let mut activations = vec![x.clone()];
        let mut z_values = Vec::with_capacity(self.weights.len());
        let last = self.weights.len() - 1;

        for (i, (w, b)) in self.weights.iter().zip(self.biases.iter()).enumerate() {
            let z = activations[i].dot(w) + b;
            let activation = if i < last {
                self.config.hidden_activation
            } else {
                self.config.output_activation
            };
            activations.push(activation.apply(&z));
            z_values.push(z);
        }

        (activations, z_values)
    }

    fn backward(
        &self,
        y: &Array1<f64>,
        activations: &[Array2<f64>],
        z_values: &[Array2<f64>],
    ) -> Vec<(Array2<f64>, Array1<f64>)> {
        let n = y.len() as f64;
        let last = self.weights.len() - 1;
        let mut gradients = Vec::with_capacity(self.weights.len());

        // d|pred - y| / dpred, averaged over the batch
        let y_2d = y.clone().insert_axis(Axis(1));
        let residual = &activations[last + 1] - &y_2d;
        let mut delta = residual.mapv(|r| {
            if r > 0.0 {
                1.0 / n
            } else if r < 0.0 {
                -1.0 / n
            } else {
                0.0
            }
        }) * self.config.output_activation.derivative(&z_values[last]);

        for i in (0..self.weights.len()).rev() {
            let grad_w = activations[i].t().dot(&delta);
            let grad_b = delta.sum_axis(Axis(0));
            gradients.push((grad_w, grad_b));

            if i > 0 {
                delta = delta.dot(&self.weights[i].t())
                    * self.config.hidden_activation.derivative(&z_values[i - 1]);
            }
        }

        gradients.reverse();
        gradients
    }

    fn adam_step(&mut self, gradients: Vec<(Array2<f64>, Array1<f64>)>) {
        let ModelConfig { learning_rate, beta1, beta2, adam_epsilon, .. } = self.config;

        self.optimizer.step += 1;
        let t = self.optimizer.step as f64;
        let lr_t = learning_rate * (1.0 - beta2.powf(t)).sqrt() / (1.0 - beta1.powf(t));

        for (i, (grad_w, grad_b)) in gradients.into_iter().enumerate() {
            let opt = &mut self.optimizer;

            opt.m_w[i] = &opt.m_w[i] * beta1 + &grad_w * (1.0 - beta1);
            opt.v_w[i] = &opt.v_w[i] * beta2 + (&grad_w * &grad_w) * (1.0 - beta2);
            opt.m_b[i] = &opt.m_b[i] * beta1 + &grad_b * (1.0 - beta1);
            opt.v_b[i] = &opt.v_b[i] * beta2 + (&grad_b * &grad_b) * (1.0 - beta2);

            let step_w = &opt.m_w[i] * lr_t / (opt.v_w[i].mapv(f64::sqrt) + adam_epsilon);
            let step_b = &opt.m_b[i] * lr_t / (opt.v_b[i].mapv(f64::sqrt) + adam_epsilon);

            self.weights[i] -= &step_w;
            self.biases[i] -= &step_b;
        }
    }
}

fn mean_absolute_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / y_true.len() as f64
}

/// A serialized model waiting to be renamed over its target.
///
/// Dropping it without committing removes the temporary file.
#[derive(Debug)]
pub struct StagedArtifact {
    file: tempfile::NamedTempFile,
    target: PathBuf,
}

impl StagedArtifact {
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Rename the staged file over the target.
    pub fn commit(self) -> Result<PathBuf> {
        self.file.persist(&self.target).map_err(|e| CrashcastError::Io(e.error))?;
        debug!(path = %self.target.display(), "Model written");
        Ok(self.target)
    }
}
