//! Integration test: Full pipeline (CSV → folds → checkpoints → result table)

use chainperf::data::{Dataset, SchemaRegistry, Task, WindowedDataset};
use chainperf::error::ChainPerfError;
use chainperf::export::load_checkpoint;
use chainperf::preprocessing::MinMaxScaler;
use chainperf::training::{
    evaluate_model, CrossValidationOrchestrator, EnsembleConfig, KFold, TrainingConfig,
};
use polars::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fs::File;
use std::path::Path;

/// MMBPD-shaped table: id, two features, throughput, latency
fn write_mmbpd_csv(dir: &Path, n: usize) {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut id = Vec::with_capacity(n);
    let mut x0 = Vec::with_capacity(n);
    let mut x1 = Vec::with_capacity(n);
    let mut throughput = Vec::with_capacity(n);
    let mut latency = Vec::with_capacity(n);

    for i in 0..n {
        let a: f64 = rng.gen_range(0.0..10.0);
        let b: f64 = rng.gen_range(0.0..10.0);
        id.push(i as f64);
        x0.push(a);
        x1.push(b);
        throughput.push(2.0 * a + 3.0 * b + rng.gen_range(-0.5..0.5));
        latency.push(1.0 + 0.1 * a * b);
    }

    let mut df = df!(
        "id" => &id,
        "block_size" => &x0,
        "send_rate" => &x1,
        "throughput" => &throughput,
        "latency" => &latency
    )
    .unwrap();

    let mut file = File::create(dir.join("MMBPD.csv")).unwrap();
    CsvWriter::new(&mut file).include_header(true).finish(&mut df).unwrap();
}

fn quick_training() -> TrainingConfig {
    TrainingConfig::default()
        .with_learning_rate(0.02)
        .with_batch_size(16)
        .with_max_epochs(200)
        .with_val_every(5)
        .with_patience(10)
}

fn mmbpd_config(data_dir: &Path, output_dir: &Path) -> EnsembleConfig {
    EnsembleConfig::new("MMBPD", Task::Throughput)
        .with_data_dir(data_dir)
        .with_output_dir(output_dir)
        .with_training(quick_training())
}

/// MAE of predicting each fold's train mean on its test split
fn mean_baseline_mae(dataset: &Dataset) -> f64 {
    let splits = KFold::default().split(dataset.n_records()).unwrap();
    let total: f64 = splits
        .iter()
        .map(|split| {
            let (_, y_train) = dataset.select(&split.train_indices).unwrap();
            let (_, y_test) = dataset.select(&split.test_indices).unwrap();
            let mean = y_train.mean().unwrap();
            y_test.iter().map(|y| (y - mean).abs()).sum::<f64>() / y_test.len() as f64
        })
        .sum();
    total / splits.len() as f64
}

#[test]
fn test_mmbpd_throughput_end_to_end() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_mmbpd_csv(data.path(), 100);

    let config = mmbpd_config(data.path(), out.path());
    let report = CrossValidationOrchestrator::new(config.clone()).run().expect("run should succeed");

    assert_eq!(report.folds.len(), 5);
    let tested: usize = report.folds.iter().map(|f| f.n_test).sum();
    assert_eq!(tested, 100, "every record is held out exactly once");
    for fold in &report.folds {
        assert_eq!(fold.n_train + fold.n_test, 100);
        assert!(fold.test_metrics.is_finite());
        assert!(config.checkpoint_path(fold.member).exists(), "missing checkpoint for member {}", fold.member);
    }

    let dataset = chainperf::data::DataLoader::new(data.path())
        .load_dataset("MMBPD", SchemaRegistry::builtin().lookup("MMBPD", Task::Throughput).unwrap())
        .unwrap();
    let baseline = mean_baseline_mae(&dataset);
    assert!(
        report.mean.mae < baseline,
        "ensemble MAE {} should beat the mean baseline {}",
        report.mean.mae,
        baseline
    );

    let text = std::fs::read_to_string(out.path().join("MMBPD/Throughput/Ensemble_result.csv")).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "throughput_MAE,throughput_RMSE,throughput_MAPE");
    assert_eq!(lines.len(), 8, "header + 5 folds + mean + std");

    let mean_row: Vec<f64> = lines[6].split(',').map(|v| v.parse().unwrap()).collect();
    assert!((mean_row[0] - report.mean.mae).abs() < 1e-9);
}

#[test]
fn test_checkpoint_reproduces_test_metrics() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_mmbpd_csv(data.path(), 60);

    let config = mmbpd_config(data.path(), out.path())
        .with_training(quick_training().with_max_epochs(20));
    let report = CrossValidationOrchestrator::new(config.clone()).run().unwrap();

    let selection = SchemaRegistry::builtin().lookup("MMBPD", Task::Throughput).unwrap().clone();
    let dataset = chainperf::data::DataLoader::new(data.path()).load_dataset("MMBPD", &selection).unwrap();
    let splits = KFold::default().split(dataset.n_records()).unwrap();

    for (split, fold) in splits.iter().zip(&report.folds) {
        let (model, metadata) = load_checkpoint(&fold.checkpoint_path).unwrap();
        assert_eq!(metadata.member, fold.member);
        assert_eq!(metadata.dataset, "MMBPD");
        assert_eq!(metadata.input_dim, 2);

        let (x_test, y_test) = dataset.select(&split.test_indices).unwrap();
        let x_test = MinMaxScaler::new().transform(&x_test, &fold.scaler).unwrap();
        let test = WindowedDataset::new(x_test.view(), y_test.view()).unwrap();
        let (_, metrics) = evaluate_model(&model, &test).unwrap();
        assert_eq!(metrics, fold.test_metrics);
    }
}

#[test]
fn test_parallel_folds_match_sequential() {
    let data = tempfile::tempdir().unwrap();
    write_mmbpd_csv(data.path(), 50);
    let training = quick_training().with_max_epochs(15);

    let seq_out = tempfile::tempdir().unwrap();
    let sequential = CrossValidationOrchestrator::new(
        mmbpd_config(data.path(), seq_out.path()).with_training(training.clone()),
    )
    .run()
    .unwrap();

    let par_out = tempfile::tempdir().unwrap();
    let parallel = CrossValidationOrchestrator::new(
        mmbpd_config(data.path(), par_out.path())
            .with_training(training)
            .with_parallel_folds(true),
    )
    .run()
    .unwrap();

    let members: Vec<usize> = parallel.folds.iter().map(|f| f.member).collect();
    assert_eq!(members, vec![1, 2, 3, 4, 5], "fold order must be preserved");
    assert_eq!(sequential.table.rows(), parallel.table.rows());
    assert_eq!(sequential.mean, parallel.mean);
}

#[test]
fn test_unknown_dataset_rejected() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let config = EnsembleConfig::new("BPD-2", Task::Latency)
        .with_data_dir(data.path())
        .with_output_dir(out.path());

    let err = CrossValidationOrchestrator::new(config).run().unwrap_err();
    assert!(matches!(err, ChainPerfError::ConfigError(_)), "got {:?}", err);
}

#[test]
fn test_missing_csv_rejected() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let err = CrossValidationOrchestrator::new(mmbpd_config(data.path(), out.path()))
        .run()
        .unwrap_err();
    assert!(matches!(err, ChainPerfError::DataError(_)), "got {:?}", err);
}

#[test]
fn test_too_few_columns_rejected() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let mut df = df!(
        "a" => &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        "b" => &[2.0, 3.0, 4.0, 5.0, 6.0, 7.0],
        "c" => &[3.0, 4.0, 5.0, 6.0, 7.0, 8.0]
    )
    .unwrap();
    let mut file = File::create(data.path().join("MMBPD.csv")).unwrap();
    CsvWriter::new(&mut file).include_header(true).finish(&mut df).unwrap();

    let err = CrossValidationOrchestrator::new(mmbpd_config(data.path(), out.path()))
        .run()
        .unwrap_err();
    assert!(matches!(err, ChainPerfError::DataError(_)), "got {:?}", err);
    assert!(!out.path().join("MMBPD/Throughput/Ensemble_result.csv").exists());
}

#[test]
fn test_fewer_records_than_folds_rejected() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_mmbpd_csv(data.path(), 4);

    let err = CrossValidationOrchestrator::new(mmbpd_config(data.path(), out.path()))
        .run()
        .unwrap_err();
    assert!(matches!(err, ChainPerfError::DataError(_)), "got {:?}", err);
}
