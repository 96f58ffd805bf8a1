//! Pipeline and model configuration
//!
//! Column lists, the log offset and every network hyperparameter live
//! here rather than inside the trainer, so tests can drive the pipeline
//! with synthetic column sets.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::training::Activation;

/// Offset added before taking a logarithm.
pub const DEFAULT_EPSILON: f64 = 1e-6;

/// Prefix given to log-transformed columns.
pub const LOG_PREFIX: &str = "Log ";

/// Dataset-level configuration shared by training and scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Column holding the crash count
    pub label_column: String,
    /// Columns replaced by `Log <name>` during training
    pub log_columns: Vec<String>,
    /// Offset added before the logarithm
    pub epsilon: f64,
    /// Seed for the k-fold shuffle
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            label_column: "Crashes".to_string(),
            log_columns: vec!["Length".to_string(), "ADT".to_string()],
            epsilon: DEFAULT_EPSILON,
            seed: 42,
        }
    }
}

impl PipelineConfig {
    pub fn new(label_column: impl Into<String>) -> Self {
        Self {
            label_column: label_column.into(),
            ..Default::default()
        }
    }

    pub fn with_log_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.log_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Apply `LABEL_COLUMN`, `LOG_COLUMNS` and `KFOLD_SEED` overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(label) = std::env::var("LABEL_COLUMN") {
            if !label.trim().is_empty() {
                config.label_column = label.trim().to_string();
            }
        }
        if let Ok(columns) = std::env::var("LOG_COLUMNS") {
            config.log_columns = columns
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(seed) = std::env::var("KFOLD_SEED").ok().and_then(|s| s.parse().ok()) {
            config.seed = seed;
        }
        config
    }
}

/// Network hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Hidden layer widths
    pub hidden_layers: Vec<usize>,
    /// Activation for hidden layers
    pub hidden_activation: Activation,
    /// Activation for the single output unit
    pub output_activation: Activation,
    /// Adam step size
    pub learning_rate: f64,
    /// Mini-batch size
    pub batch_size: usize,
    /// Trailing fraction of the training rows held out for monitoring
    pub validation_split: f64,
    pub beta1: f64,
    pub beta2: f64,
    /// Adam denominator offset
    pub adam_epsilon: f64,
    /// Seed for weight init and per-epoch shuffling
    pub random_state: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![64, 64],
            hidden_activation: Activation::ReLU,
            output_activation: Activation::Linear,
            learning_rate: 1e-3,
            batch_size: 32,
            validation_split: 0.2,
            beta1: 0.9,
            beta2: 0.999,
            adam_epsilon: 1e-7,
            random_state: Some(42),
        }
    }
}

impl ModelConfig {
    pub fn with_output_activation(mut self, activation: Activation) -> Self {
        self.output_activation = activation;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_hidden_layers(mut self, layers: Vec<usize>) -> Self {
        self.hidden_layers = layers;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_validation_split(mut self, split: f64) -> Self {
        self.validation_split = split;
        self
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }
}

/// How the network is carried between folds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldModelPolicy {
    /// Build a new network for every fold; fold metrics are independent.
    #[default]
    FreshPerFold,
    /// Build once on the first fold and keep fitting it on later folds.
    Carryover,
}

impl std::str::FromStr for FoldModelPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fresh" | "fresh_per_fold" => Ok(Self::FreshPerFold),
            "carryover" | "carry_over" => Ok(Self::Carryover),
            other => Err(format!("unknown fold policy: {other}")),
        }
    }
}

impl FoldModelPolicy {
    /// `FOLD_POLICY` if set and valid, otherwise the default.
    pub fn from_env() -> Self {
        Self::from_setting(std::env::var("FOLD_POLICY").ok().as_deref())
    }

    /// Parse a configured policy, warning about and ignoring invalid values.
    pub fn from_setting(value: Option<&str>) -> Self {
        match value.map(str::parse::<Self>) {
            Some(Ok(policy)) => policy,
            Some(Err(err)) => {
                let fallback = Self::default();
                warn!(value = value.unwrap_or_default(), ?fallback, "Ignoring invalid FOLD_POLICY: {}", err);
                fallback
            }
            None => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.label_column, "Crashes");
        assert_eq!(config.log_columns, vec!["Length", "ADT"]);
        assert_eq!(config.epsilon, 1e-6);
    }

    #[test]
    fn test_pipeline_builders() {
        let config = PipelineConfig::new("y")
            .with_log_columns(["a", "b", "c"])
            .with_seed(7);
        assert_eq!(config.label_column, "y");
        assert_eq!(config.log_columns.len(), 3);
        assert_eq!(config.seed, 7);
    }

    #[test]
    fn test_model_defaults() {
        let config = ModelConfig::default();
        assert_eq!(config.hidden_layers, vec![64, 64]);
        assert_eq!(config.output_activation, Activation::Linear);
        assert_eq!(config.validation_split, 0.2);
    }

    #[test]
    fn test_fold_policy_setting() {
        assert_eq!(FoldModelPolicy::from_setting(Some("carryover")), FoldModelPolicy::Carryover);
        assert_eq!(FoldModelPolicy::from_setting(Some("sometimes")), FoldModelPolicy::FreshPerFold);
        assert_eq!(FoldModelPolicy::from_setting(None), FoldModelPolicy::FreshPerFold);
    }

    #[test]
    fn test_fold_policy_parse() {
        assert_eq!("fresh".parse::<FoldModelPolicy>().unwrap(), FoldModelPolicy::FreshPerFold);
        assert_eq!("Carryover".parse::<FoldModelPolicy>().unwrap(), FoldModelPolicy::Carryover);
        assert!("sometimes".parse::<FoldModelPolicy>().is_err());
    }
}
