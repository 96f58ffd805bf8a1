//! Regression metrics for held-out folds

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{CrashcastError, Result};

/// Decimal places used when reporting aggregates
pub const REPORT_DECIMALS: i32 = 4;

/// Scores for one held-out fold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoldMetrics {
    pub mse: f64,
    pub mae: f64,
    pub r2: f64,
}

impl FoldMetrics {
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(CrashcastError::Shape {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }
        if y_true.is_empty() {
            return Err(CrashcastError::Validation("cannot score an empty fold".to_string()));
        }

        let n = y_true.len() as f64;
        let errors: Vec<f64> = y_true.iter().zip(y_pred.iter()).map(|(t, p)| t - p).collect();

        let ss_res: f64 = errors.iter().map(|e| e * e).sum();
        let mse = ss_res / n;
        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;

        let y_mean = y_true.sum() / n;
        let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();

        // Constant targets: perfect predictions score 1, anything else 0.
        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };

        Ok(Self { mse, mae, r2 })
    }
}

/// Fold means, rounded for reporting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
    #[serde(rename = "Average MSE")]
    pub mse: f64,
    #[serde(rename = "Average MAE")]
    pub mae: f64,
    #[serde(rename = "Average R²")]
    pub r2: f64,
}

impl AggregateMetrics {
    pub fn from_folds(folds: &[FoldMetrics]) -> Result<Self> {
        if folds.is_empty() {
            return Err(CrashcastError::Validation("no folds to aggregate".to_string()));
        }
        let n = folds.len() as f64;
        let mean = |f: fn(&FoldMetrics) -> f64| round_to(folds.iter().map(f).sum::<f64>() / n, REPORT_DECIMALS);

        Ok(Self {
            mse: mean(|m| m.mse),
            mae: mean(|m| m.mae),
            r2: mean(|m| m.r2),
        })
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
