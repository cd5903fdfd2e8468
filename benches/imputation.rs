use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use phenoqc::config::{
    ConfigurationResolver, CorrelationMethod, ImputationSection, MiceParams, Scoring, StrategyConfig,
};
use phenoqc::diagnostics::{DiagnosticsRunner, MiUncertaintyRunner};
use phenoqc::imputation::executor_for;
use phenoqc::quality::RedundancyDetector;
use phenoqc::tuning::{ParamGrid, QuickTuner};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde_json::json;

fn create_matrix(n_rows: usize, n_cols: usize, missing: f64) -> (Array2<f64>, Array2<bool>) {
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let x = Array2::from_shape_fn((n_rows, n_cols), |_| {
        if rng.gen::<f64>() < missing {
            f64::NAN
        } else {
            rng.gen::<f64>() * 10.0
        }
    });
    let mask = x.mapv(f64::is_nan);
    (x, mask)
}

fn bench_executors(c: &mut Criterion) {
    let mut group = c.benchmark_group("impute");
    group.sample_size(10);

    let (x, mask) = create_matrix(2000, 10, 0.1);
    for name in ["mean", "median", "knn", "mice", "svd"] {
        let strategy = StrategyConfig::from_parts(name, &Default::default()).unwrap();
        let imputer = executor_for(&strategy);
        group.bench_with_input(BenchmarkId::new("complete", name), &name, |b, _| {
            b.iter(|| imputer.complete(black_box(&x), black_box(&mask)).unwrap())
        });
    }

    group.finish();
}

fn bench_tuning(c: &mut Criterion) {
    let mut group = c.benchmark_group("tuning");
    group.sample_size(10);

    let (x, mask) = create_matrix(1000, 8, 0.05);
    let grid_map = json!({"n_neighbors": [3, 5, 10]}).as_object().cloned().unwrap();
    let grid = ParamGrid::from_map(&grid_map);
    let base = StrategyConfig::from_parts("knn", &Default::default()).unwrap();
    let tuner = QuickTuner::new(0.1, Scoring::Mae, 50_000, 42);

    group.bench_function("knn_grid", |b| {
        b.iter(|| tuner.tune(black_box(&x), &mask, &base, &grid).unwrap())
    });

    let columns: Vec<String> = (0..8).map(|j| format!("c{}", j)).collect();
    let plan = ConfigurationResolver::resolve(&ImputationSection::new("mean"), &columns).unwrap();
    group.bench_function("diagnostics_mean_x5", |b| {
        let runner = DiagnosticsRunner::new(5, 0.1, Scoring::Mae, 42);
        b.iter(|| runner.run(black_box(&x), &mask, &plan).unwrap())
    });

    group.bench_function("mi_uncertainty_x3", |b| {
        let params = MiceParams { max_iter: 4, random_state: None };
        let runner = MiUncertaintyRunner::new(3, params, 42);
        b.iter(|| runner.run(black_box(&x), &mask, &columns).unwrap())
    });

    group.finish();
}

fn bench_redundancy(c: &mut Criterion) {
    let (x, _) = create_matrix(5000, 30, 0.0);
    let columns: Vec<String> = (0..30).map(|j| format!("c{}", j)).collect();

    c.bench_function("redundancy_spearman", |b| {
        let detector = RedundancyDetector::new(0.9, CorrelationMethod::Spearman);
        b.iter(|| detector.detect(black_box(&x), &columns))
    });
}

criterion_group!(benches, bench_executors, bench_tuning, bench_redundancy);
criterion_main!(benches);
