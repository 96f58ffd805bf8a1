//! Integration test: Training pipeline end-to-end

use crashcast::prelude::*;
use crashcast::training::{CVSplit, REPORT_DECIMALS};
use ndarray::{array, Array2};
use polars::prelude::*;

/// Synthetic road segments; crashes grow with length and traffic.
fn roads_csv(n: usize) -> String {
    let mut csv = String::from("Length,ADT,Lanes,Crashes\n");
    for i in 0..n {
        let length = 0.2 + (i % 11) as f64 * 0.35;
        let adt = 800.0 + ((i * 53) % 97) as f64 * 120.0;
        let lanes = 2 + i % 3;
        let crashes = (length * adt / 2500.0 + lanes as f64 * 0.5).round();
        csv.push_str(&format!("{length},{adt},{lanes},{crashes}\n"));
    }
    csv
}

fn small_model() -> ModelConfig {
    ModelConfig::default().with_hidden_layers(vec![16, 16])
}

#[test]
fn test_kfold_tests_every_row_exactly_once() {
    for (n, k) in [(10, 2), (11, 3), (57, 5), (100, 10), (7, 7)] {
        let splits: Vec<CVSplit> = KFold::new(k).with_random_state(42).split(n).unwrap();
        assert_eq!(splits.len(), k);

        let mut seen = vec![0usize; n];
        for split in &splits {
            for &idx in &split.test_indices {
                seen[idx] += 1;
            }
            assert_eq!(split.train_indices.len() + split.test_indices.len(), n);
        }
        assert!(seen.iter().all(|&c| c == 1), "n={n} k={k}: {seen:?}");
    }
}

#[test]
fn test_transformer_swaps_named_columns() {
    let dataset = Dataset::new(
        vec!["Length".into(), "ADT".into(), "Lanes".into(), "Crashes".into()],
        array![[1.0, 100.0, 2.0, 3.0], [2.0, 200.0, 4.0, 1.0]],
    )
    .unwrap();

    let transformer = FeatureTransformer::from_config(&PipelineConfig::default());
    let out = transformer.transform(&dataset).unwrap();

    assert_eq!(out.columns(), &["Lanes", "Crashes", "Log Length", "Log ADT"]);
    let log_adt = out.column("Log ADT").unwrap();
    assert!((log_adt[0] - (100.0f64 + 1e-6).ln()).abs() < 1e-12);
    assert_eq!(out.column("Lanes").unwrap(), array![2.0, 4.0]);
}

#[test]
fn test_aggregate_is_mean_of_known_folds() {
    // Constant predictor 0 against targets with closed-form errors
    let folds: Vec<FoldMetrics> = [vec![1.0, 1.0], vec![2.0, 2.0], vec![1.0, 3.0]]
        .into_iter()
        .map(|y| {
            let y = ndarray::Array1::from(y);
            FoldMetrics::compute(&y, &ndarray::Array1::zeros(y.len())).unwrap()
        })
        .collect();

    // fold MSEs 1, 4, 5; MAEs 1, 2, 2
    let agg = AggregateMetrics::from_folds(&folds).unwrap();
    assert_eq!(agg.mse, 3.3333);
    assert_eq!(agg.mae, 1.6667);
    assert_eq!(REPORT_DECIMALS, 4);
}

#[test]
fn test_train_from_csv_bytes_persists_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("crash_prediction_dnn_model.json");
    let trainer = CrossValidationTrainer::new(PipelineConfig::default(), small_model(), &artifact);

    let outcome = trainer.run_csv(roads_csv(60).as_bytes(), 3, 5).unwrap();
    let report = &outcome.report;

    assert_eq!(report.folds.len(), 5);
    assert_eq!(report.rows_used, 60);
    assert!(report.aggregate.mse.is_finite());
    assert!(report.aggregate.mae >= 0.0);
    for fold in &report.folds {
        assert_eq!(fold.test_rows, 12);
        assert_eq!(fold.train_rows, 48);
    }

    let loaded = CrashRegressor::load(&artifact).unwrap();
    assert_eq!(loaded.feature_names(), &["Lanes", "Log Length", "Log ADT"]);

    let x = Array2::from_shape_vec((2, 3), vec![2.0, 0.5, 7.0, 3.0, 1.2, 8.5]).unwrap();
    let preds = loaded.predict(&x).unwrap();
    assert_eq!(preds.len(), 2);
    assert!(preds.iter().all(|p| p.is_finite()));
}

#[test]
fn test_rows_with_missing_values_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let trainer = CrossValidationTrainer::new(PipelineConfig::default(), small_model(), dir.path().join("m.json"));

    let mut csv = roads_csv(20);
    csv.push_str("1.0,,2,3\n");
    csv.push_str(",900,2,1\n");

    let outcome = trainer.run_csv(csv.as_bytes(), 1, 4).unwrap();
    assert_eq!(outcome.report.rows_dropped, 2);
    assert_eq!(outcome.report.rows_used, 20);
}

#[test]
fn test_seeded_training_is_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    let trainer = CrossValidationTrainer::new(PipelineConfig::default(), small_model(), dir.path().join("m.json"));
    let csv = roads_csv(40);

    let a = trainer.run_csv(csv.as_bytes(), 2, 4).unwrap();
    let b = trainer.run_csv(csv.as_bytes(), 2, 4).unwrap();

    assert_eq!(a.report.aggregate, b.report.aggregate);
    for (fa, fb) in a.report.folds.iter().zip(&b.report.folds) {
        assert_eq!(fa.metrics, fb.metrics);
        assert_eq!(fa.test_rows, fb.test_rows);
    }
}

#[test]
fn test_policies_are_distinct() {
    let dir = tempfile::tempdir().unwrap();
    let csv = roads_csv(30);
    let run = |policy| {
        CrossValidationTrainer::new(PipelineConfig::default(), small_model(), dir.path().join("m.json"))
            .with_policy(policy)
            .run_csv(csv.as_bytes(), 2, 3)
            .unwrap()
    };

    let fresh = run(FoldModelPolicy::FreshPerFold);
    let carried = run(FoldModelPolicy::Carryover);

    assert_eq!(fresh.model.epochs_trained(), 2);
    assert_eq!(carried.model.epochs_trained(), 6);
    assert_eq!(fresh.report.policy, FoldModelPolicy::FreshPerFold);
    assert_eq!(carried.report.policy, FoldModelPolicy::Carryover);
}

#[test]
fn test_custom_columns() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = PipelineConfig::new("y").with_log_columns(["a"]).with_seed(7);
    let trainer = CrossValidationTrainer::new(pipeline, small_model(), dir.path().join("m.json"));

    let a: Vec<f64> = (1..=20).map(|i| i as f64).collect();
    let b: Vec<f64> = (1..=20).map(|i| (i % 4) as f64).collect();
    let y: Vec<f64> = a.iter().zip(&b).map(|(a, b)| a.ln() + b).collect();
    let df = df!("a" => a, "b" => b, "y" => y).unwrap();

    let outcome = trainer.run(&df, 2, 4).unwrap();
    assert_eq!(outcome.model.feature_names(), &["b", "Log a"]);
}

#[test]
fn test_failed_training_reports_error() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("m.json");
    let trainer = CrossValidationTrainer::new(PipelineConfig::default(), small_model(), &artifact);

    assert!(trainer.run_csv(b"", 1, 2).is_err());
    assert!(trainer.run_csv(roads_csv(3).as_bytes(), 1, 5).is_err());
    assert!(!artifact.exists());
}
