use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use crashcast::prelude::*;
use ndarray::Array2;
use polars::prelude::*;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn create_road_data(n_rows: usize) -> DataFrame {
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    let length: Vec<f64> = (0..n_rows).map(|_| rng.gen_range(0.1..5.0)).collect();
    let adt: Vec<f64> = (0..n_rows).map(|_| rng.gen_range(500.0..20000.0)).collect();
    let crashes: Vec<f64> = length
        .iter()
        .zip(&adt)
        .map(|(l, a)| (l * a / 4000.0 + rng.gen::<f64>()).floor())
        .collect();

    df!("Length" => length, "ADT" => adt, "Crashes" => crashes).unwrap()
}

fn bench_cross_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("cross_validation");
    group.sample_size(10);

    let dir = tempfile::tempdir().unwrap();
    let trainer = CrossValidationTrainer::new(
        PipelineConfig::default(),
        ModelConfig::default(),
        dir.path().join("bench_model.json"),
    );

    for n_rows in [500, 2000].iter() {
        let df = create_road_data(*n_rows);

        group.bench_with_input(BenchmarkId::new("5_fold_3_epochs", n_rows), &df, |b, df| {
            b.iter(|| trainer.run(black_box(df), 3, 5).unwrap())
        });
    }

    group.finish();
}

fn bench_prediction(c: &mut Criterion) {
    let mut group = c.benchmark_group("prediction");

    let dir = tempfile::tempdir().unwrap();
    let trainer = CrossValidationTrainer::new(
        PipelineConfig::default(),
        ModelConfig::default(),
        dir.path().join("bench_model.json"),
    );
    let model = trainer.run(&create_road_data(1000), 3, 2).unwrap().model;

    for n_rows in [100, 1000, 10000].iter() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let x = Array2::from_shape_fn((*n_rows, 2), |(_, j)| {
            if j == 0 {
                rng.gen_range(-2.0..1.5)
            } else {
                rng.gen_range(6.0..10.0)
            }
        });

        group.bench_with_input(BenchmarkId::new("predict", n_rows), &x, |b, x| {
            b.iter(|| model.predict(black_box(x)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_cross_validation, bench_prediction);
criterion_main!(benches);
