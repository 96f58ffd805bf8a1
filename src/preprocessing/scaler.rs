//! Normalization stage

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{CrashcastError, Result};

/// Lower bound on the per-feature standard deviation
const MIN_STD: f64 = 1e-7;

/// Zero-mean / unit-variance rescaling learned from training rows only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    mean: Array1<f64>,
    variance: Array1<f64>,
}

impl Normalization {
    /// Learn per-feature mean and population variance.
    pub fn adapt(x: &Array2<f64>) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(CrashcastError::Training(
                "cannot adapt normalization on an empty partition".to_string(),
            ));
        }
        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| CrashcastError::Training("empty feature matrix".to_string()))?;
        let variance = x.var_axis(Axis(0), 0.0);
        Ok(Self { mean, variance })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn variance(&self) -> &Array1<f64> {
        &self.variance
    }

    pub fn apply(&self, x: &Array2<f64>) -> Array2<f64> {
        let std = self.variance.mapv(|v| v.sqrt().max(MIN_STD));
        (x - &self.mean) / &std
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_adapt_and_apply() {
        let x = array![[1.0, 10.0], [3.0, 10.0]];
        let norm = Normalization::adapt(&x).unwrap();

        assert_eq!(norm.mean(), &array![2.0, 10.0]);
        assert_eq!(norm.variance(), &array![1.0, 0.0]);

        let out = norm.apply(&x);
        assert!((out[[0, 0]] + 1.0).abs() < 1e-12);
        assert!((out[[1, 0]] - 1.0).abs() < 1e-12);
        // constant column maps to zero rather than dividing by zero
        assert_eq!(out[[0, 1]], 0.0);
    }

    #[test]
    fn test_adapt_empty() {
        let x = Array2::<f64>::zeros((0, 3));
        assert!(Normalization::adapt(&x).is_err());
    }
}
