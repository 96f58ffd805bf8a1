//! Log feature transforms
//!
//! Two entry points with deliberately different column selection:
//!
//! * [`FeatureTransformer`] replaces a fixed list of named columns with
//!   `Log <name>` columns and is used for training partitions.
//! * [`log_transform_all`] logs every column in place, keeping names, and
//!   is used on prediction requests.
//!
//! Both are per-row functions with no fitted state. Inputs where
//! `value + epsilon <= 0` yield NaN or -inf; callers decide what to do
//! with that.

use ndarray::Array1;

use crate::config::{PipelineConfig, LOG_PREFIX};
use crate::data::Dataset;
use crate::error::Result;

#[inline]
pub fn log_offset(value: f64, epsilon: f64) -> f64 {
    (value + epsilon).ln()
}

/// Replaces named columns with their `ln(x + epsilon)` counterparts.
#[derive(Debug, Clone)]
pub struct FeatureTransformer {
    log_columns: Vec<String>,
    epsilon: f64,
}

impl FeatureTransformer {
    pub fn new(log_columns: Vec<String>, epsilon: f64) -> Self {
        Self { log_columns, epsilon }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.log_columns.clone(), config.epsilon)
    }

    pub fn log_columns(&self) -> &[String] {
        &self.log_columns
    }

    pub fn output_name(column: &str) -> String {
        format!("{LOG_PREFIX}{column}")
    }

    /// Transform a dataset. Listed columns that are absent are skipped.
    /// Originals are removed and the new columns appended in list order.
    pub fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        let mut out = dataset.clone();
        let mut derived: Vec<(String, Array1<f64>)> = Vec::with_capacity(self.log_columns.len());

        for name in &self.log_columns {
            if out.column_index(name).is_none() {
                continue;
            }
            let source = out.pop_column(name)?;
            let eps = self.epsilon;
            derived.push((Self::output_name(name), source.mapv(|v| log_offset(v, eps))));
        }

        for (name, values) in derived {
            out.push_column(name, values)?;
        }

        Ok(out)
    }

    /// Transform and split off the label column.
    pub fn transform_with_label(&self, dataset: &Dataset, label: &str) -> Result<(Dataset, Array1<f64>)> {
        let mut transformed = self.transform(dataset)?;
        let labels = transformed.pop_column(label)?;
        Ok((transformed, labels))
    }
}

/// Log every column of a request dataset in place.
pub fn log_transform_all(dataset: &mut Dataset, epsilon: f64) {
    dataset.map_values_inplace(|v| log_offset(v, epsilon));
}
