//! Model factory

use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::config::ModelConfig;
use crate::error::{CrashcastError, Result};
use crate::preprocessing::Normalization;

use super::neural_network::{AdamState, CrashRegressor};

/// Build an untrained network on top of a fitted normalization stage.
///
/// Every call returns an independent model; nothing is shared between calls.
pub fn build_and_compile(
    normalization: Normalization,
    feature_names: Vec<String>,
    config: &ModelConfig,
) -> Result<CrashRegressor> {
    validate(config)?;

    let n_features = normalization.n_features();
    if n_features == 0 {
        return Err(CrashcastError::Training("model needs at least one feature".to_string()));
    }
    if feature_names.len() != n_features {
        return Err(CrashcastError::Shape {
            expected: format!("{} feature names", n_features),
            actual: format!("{} feature names", feature_names.len()),
        });
    }

    let mut rng = match config.random_state {
        Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
        None => Xoshiro256PlusPlus::from_entropy(),
    };

    let mut layer_sizes = vec![n_features];
    layer_sizes.extend(&config.hidden_layers);
    layer_sizes.push(1);

    let mut weights = Vec::with_capacity(layer_sizes.len() - 1);
    let mut biases = Vec::with_capacity(layer_sizes.len() - 1);

    for pair in layer_sizes.windows(2) {
        let (n_in, n_out) = (pair[0], pair[1]);
        // Glorot uniform
        let limit = (6.0 / (n_in + n_out) as f64).sqrt();
        weights.push(Array2::from_shape_fn((n_in, n_out), |_| rng.gen_range(-limit..limit)));
        biases.push(Array1::zeros(n_out));
    }

    let optimizer = AdamState::zeros_like(&weights, &biases);

    Ok(CrashRegressor {
        config: config.clone(),
        feature_names,
        normalization,
        weights,
        biases,
        optimizer,
        epochs_trained: 0,
        trained_at: None,
    })
}

fn validate(config: &ModelConfig) -> Result<()> {
    if config.hidden_layers.iter().any(|&w| w == 0) {
        return Err(CrashcastError::Validation("hidden layers must be non-empty".to_string()));
    }
    if config.batch_size == 0 {
        return Err(CrashcastError::Validation("batch_size must be positive".to_string()));
    }
    if !(0.0..1.0).contains(&config.validation_split) {
        return Err(CrashcastError::Validation(format!(
            "validation_split must be in [0, 1), got {}",
            config.validation_split
        )));
    }
    if !(config.learning_rate > 0.0) {
        return Err(CrashcastError::Validation(format!(
            "learning_rate must be positive, got {}",
            config.learning_rate
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn norm() -> Normalization {
        Normalization::adapt(&array![[1.0, 2.0, 3.0], [2.0, 3.0, 4.0]]).unwrap()
    }

    fn names() -> Vec<String> {
        vec!["a".into(), "b".into(), "c".into()]
    }

    #[test]
    fn test_topology() {
        let model = build_and_compile(norm(), names(), &ModelConfig::default()).unwrap();
        let shapes: Vec<(usize, usize)> = model.weights.iter().map(|w| w.dim()).collect();
        assert_eq!(shapes, vec![(3, 64), (64, 64), (64, 1)]);
        assert_eq!(model.n_features(), 3);
        assert_eq!(model.epochs_trained(), 0);
    }

    #[test]
    fn test_seeded_builds_match() {
        let a = build_and_compile(norm(), names(), &ModelConfig::default()).unwrap();
        let b = build_and_compile(norm(), names(), &ModelConfig::default()).unwrap();
        assert_eq!(a.weights, b.weights);
    }

    #[test]
    fn test_rejects_bad_config() {
        let config = ModelConfig::default().with_batch_size(0);
        assert!(build_and_compile(norm(), names(), &config).is_err());

        let config = ModelConfig::default().with_validation_split(1.0);
        assert!(build_and_compile(norm(), names(), &config).is_err());

        let config = ModelConfig::default().with_learning_rate(0.0);
        assert!(build_and_compile(norm(), names(), &config).is_err());
    }

    #[test]
    fn test_rejects_name_mismatch() {
        let result = build_and_compile(norm(), vec!["a".into()], &ModelConfig::default());
        assert!(matches!(result, Err(CrashcastError::Shape { .. })));
    }
}
