//! Cross-validated ensemble training
//!
//! One model per fold: the fold's train split fits a fresh scaler and a
//! fresh network, the held-out split validates and finally tests it, and the
//! trained parameters are written to `model/<dataset>/<task>/Ensemble<k>.ckpt`.
//! Per-fold test metrics plus their mean and std end up in
//! `<dataset>/<task>/Ensemble_result.csv`.

use super::cross_validation::{FoldSplit, KFold, FOLD_COUNT};
use super::metrics::{log_metrics, MetricsRecord, MetricsTable, Stage};
use super::neural_network::RegressionModel;
use super::trainer::{evaluate_model, TrainingConfig, TrainingHistory, TrainingLoop};
use crate::data::{DataLoader, Dataset, SchemaRegistry, Task, WindowedDataset};
use crate::error::{ChainPerfError, Result};
use crate::export::{save_checkpoint, write_results_csv, ModelMetadata};
use crate::preprocessing::{MinMaxScaler, ScalerState};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Settings for one cross-validation run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Dataset name, e.g. `MMBPD`
    pub dataset: String,
    pub task: Task,
    /// Directory containing `<dataset>.csv`
    pub data_dir: PathBuf,
    /// Root under which `model/` and the result directory are created
    pub output_dir: PathBuf,
    /// Seed for the fold shuffle
    pub split_seed: u64,
    pub training: TrainingConfig,
    /// Train folds concurrently on the rayon pool
    pub parallel_folds: bool,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            dataset: "MMBPD".to_string(),
            task: Task::Throughput,
            data_dir: PathBuf::from("../data"),
            output_dir: PathBuf::from("."),
            split_seed: 42,
            training: TrainingConfig::default(),
            parallel_folds: false,
        }
    }
}

impl EnsembleConfig {
    pub fn new(dataset: impl Into<String>, task: Task) -> Self {
        Self {
            dataset: dataset.into(),
            task,
            ..Default::default()
        }
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_split_seed(mut self, seed: u64) -> Self {
        self.split_seed = seed;
        self
    }

    pub fn with_training(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }

    pub fn with_parallel_folds(mut self, parallel: bool) -> Self {
        self.parallel_folds = parallel;
        self
    }

    /// Read a JSON config; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// `<output_dir>/model/<dataset>/<task>`
    pub fn model_dir(&self) -> PathBuf {
        self.output_dir
            .join("model")
            .join(&self.dataset)
            .join(self.task.as_str())
    }

    /// `<output_dir>/<dataset>/<task>`
    pub fn result_dir(&self) -> PathBuf {
        self.output_dir.join(&self.dataset).join(self.task.as_str())
    }

    /// Checkpoint path for one-based ensemble member `member`
    pub fn checkpoint_path(&self, member: usize) -> PathBuf {
        self.model_dir().join(format!("Ensemble{}.ckpt", member))
    }

    pub fn result_path(&self) -> PathBuf {
        self.result_dir().join("Ensemble_result.csv")
    }
}

/// What one fold produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldReport {
    /// One-based ensemble member index
    pub member: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub scaler: ScalerState,
    pub history: TrainingHistory,
    pub test_loss: f64,
    pub test_metrics: MetricsRecord,
    pub checkpoint_path: PathBuf,
}

/// Outcome of a full cross-validation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleReport {
    pub dataset: String,
    pub task: Task,
    pub folds: Vec<FoldReport>,
    pub table: MetricsTable,
    pub mean: MetricsRecord,
    pub std: MetricsRecord,
    pub result_path: PathBuf,
}

/// Runs every fold of one dataset/task pair and aggregates the test metrics
#[derive(Debug, Clone)]
pub struct CrossValidationOrchestrator {
    config: EnsembleConfig,
    registry: SchemaRegistry,
}

impl CrossValidationOrchestrator {
    pub fn new(config: EnsembleConfig) -> Self {
        Self {
            config,
            registry: SchemaRegistry::builtin(),
        }
    }

    /// Use a custom dataset/task schema table
    pub fn with_registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Load the configured dataset and run every fold
    pub fn run(&self) -> Result<EnsembleReport> {
        let selection = self.registry.lookup(&self.config.dataset, self.config.task)?;
        let dataset = DataLoader::new(&self.config.data_dir).load_dataset(&self.config.dataset, selection)?;
        self.run_on(&dataset)
    }

    /// Run every fold on an already loaded dataset
    pub fn run_on(&self, dataset: &Dataset) -> Result<EnsembleReport> {
        self.config.training.validate()?;
        let start = Instant::now();

        let splits = KFold::new(FOLD_COUNT)
            .with_seed(self.config.split_seed)
            .split(dataset.n_records())?;

        fs::create_dir_all(self.config.model_dir())?;

        info!(
            dataset = %self.config.dataset,
            task = %self.config.task,
            records = dataset.n_records(),
            folds = splits.len(),
            parallel = self.config.parallel_folds,
            "Starting cross-validation"
        );

        let folds: Vec<FoldReport> = if self.config.parallel_folds {
            splits
                .par_iter()
                .map(|split| self.train_fold(dataset, split))
                .collect::<Result<Vec<_>>>()?
        } else {
            splits
                .iter()
                .map(|split| self.train_fold(dataset, split))
                .collect::<Result<Vec<_>>>()?
        };

        let mut table = MetricsTable::new();
        for fold in &folds {
            table.push(fold.test_metrics);
        }
        let (mean, std) = table.aggregate()?;

        fs::create_dir_all(self.config.result_dir())?;
        let result_path = self.config.result_path();
        write_results_csv(&result_path, self.config.task, &table.with_summary()?)?;

        info!(
            mean_mae = mean.mae,
            mean_rmse = mean.rmse,
            mean_mape = mean.mape,
            std_mae = std.mae,
            path = %result_path.display(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Cross-validation finished"
        );

        Ok(EnsembleReport {
            dataset: self.config.dataset.clone(),
            task: self.config.task,
            folds,
            table,
            mean,
            std,
            result_path,
        })
    }

    /// Train one fold and persist its checkpoint. Everything created here is
    /// owned by this call, so folds can run concurrently.
    fn train_fold(&self, dataset: &Dataset, split: &FoldSplit) -> Result<FoldReport> {
        let member = split.fold_idx + 1;
        let (x_train, y_train) = dataset.select(&split.train_indices)?;
        let (x_test, y_test) = dataset.select(&split.test_indices)?;

        let scaler = MinMaxScaler::new();
        let (x_train, scaler_state) = scaler.fit_transform(&x_train)?;
        let x_test = scaler.transform(&x_test, &scaler_state)?;

        let train = WindowedDataset::new(x_train.view(), y_train.view())?;
        let test = WindowedDataset::new(x_test.view(), y_test.view())?;

        info!(member, n_train = train.len(), n_test = test.len(), "Training ensemble member");

        let training = &self.config.training;
        let seed = training.seed.wrapping_add(split.fold_idx as u64);
        let mut model = RegressionModel::new(dataset.n_features(), seed)?.with_dropout(training.dropout)?;
        let history = TrainingLoop::new(training.clone())?
            .for_fold(member)
            .fit(&mut model, &train, &test)?;

        let checkpoint_path = self.config.checkpoint_path(member);
        let metadata = ModelMetadata::new(&self.config.dataset, self.config.task, member, model.input_dim());
        save_checkpoint(&model, metadata, &checkpoint_path)?;

        let (test_loss, test_metrics) = evaluate_model(&model, &test)?;
        if !test_metrics.is_finite() {
            return Err(ChainPerfError::NumericalError {
                stage: Stage::Test.to_string(),
                epoch: history.epochs_run,
                detail: format!("test metrics {:?}", test_metrics),
            });
        }
        log_metrics(Stage::Test, member, history.epochs_run, test_loss, &test_metrics);

        Ok(FoldReport {
            member,
            n_train: train.len(),
            n_test: test.len(),
            scaler: scaler_state,
            history,
            test_loss,
            test_metrics,
            checkpoint_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn small_dataset() -> Dataset {
        let x = Array2::from_shape_fn((30, 2), |(i, j)| ((i * (j + 2)) % 11) as f64);
        let y: Array1<f64> = x.rows().into_iter().map(|r| r[0] + 0.5 * r[1] + 1.0).collect();
        Dataset::new(x, y).unwrap()
    }

    #[test]
    fn test_paths() {
        let config = EnsembleConfig::new("HFBTP", Task::Latency).with_output_dir("/tmp/out");
        assert_eq!(config.checkpoint_path(3), PathBuf::from("/tmp/out/model/HFBTP/Latency/Ensemble3.ckpt"));
        assert_eq!(config.result_path(), PathBuf::from("/tmp/out/HFBTP/Latency/Ensemble_result.csv"));
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = EnsembleConfig::new("BPD-1", Task::Latency).with_split_seed(7);
        let parsed: EnsembleConfig = serde_json::from_str(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed.dataset, "BPD-1");
        assert_eq!(parsed.split_seed, 7);
        assert_eq!(parsed.training, config.training);

        let partial: EnsembleConfig = serde_json::from_str(r#"{"dataset": "HFBTP"}"#).unwrap();
        assert_eq!(partial.task, Task::Throughput);
        assert_eq!(partial.training.batch_size, 32);
    }

    #[test]
    fn test_run_on_writes_all_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = EnsembleConfig::new("MMBPD", Task::Throughput)
            .with_output_dir(dir.path())
            .with_training(TrainingConfig::default().with_max_epochs(20).with_learning_rate(0.01));
        let report = CrossValidationOrchestrator::new(config.clone()).run_on(&small_dataset()).unwrap();

        assert_eq!(report.folds.len(), 5);
        assert_eq!(report.table.len(), 5);
        let n_test: usize = report.folds.iter().map(|f| f.n_test).sum();
        assert_eq!(n_test, 30);
        for member in 1..=5 {
            assert!(config.checkpoint_path(member).exists());
        }

        let text = std::fs::read_to_string(config.result_path()).unwrap();
        assert_eq!(text.lines().count(), 1 + 5 + 2);
        assert!(text.starts_with("throughput_MAE,throughput_RMSE,throughput_MAPE"));
    }

    #[test]
    fn test_unknown_dataset_fails_before_training() {
        let dir = tempfile::tempdir().unwrap();
        let config = EnsembleConfig::new("NOPE", Task::Latency).with_output_dir(dir.path());
        let err = CrossValidationOrchestrator::new(config.clone()).run().unwrap_err();
        assert!(matches!(err, ChainPerfError::ConfigError(_)));
        assert!(!config.model_dir().exists());
    }

    #[test]
    fn test_invalid_training_config_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = EnsembleConfig::new("MMBPD", Task::Throughput)
            .with_output_dir(dir.path())
            .with_training(TrainingConfig::default().with_batch_size(0));
        assert!(CrossValidationOrchestrator::new(config.clone()).run_on(&small_dataset()).is_err());
        assert!(!config.result_path().exists());
    }
}
