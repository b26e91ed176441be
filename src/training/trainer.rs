//! Mini-batch training loop with periodic validation and early stopping

use super::early_stopping::{EarlyStopping, StopMode};
use super::metrics::{evaluate, log_metrics, MetricsRecord, Stage};
use super::neural_network::{RegressionModel, DEFAULT_DROPOUT};
use super::optimizer::Adam;
use crate::data::WindowedDataset;
use crate::error::{ChainPerfError, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Hyperparameters for one model's training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Adam step size
    pub learning_rate: f64,
    /// Rows per mini-batch
    pub batch_size: usize,
    /// Epoch budget
    pub max_epochs: usize,
    /// Validate every this many epochs
    pub val_every_n_epochs: usize,
    /// Validation checks without improvement before stopping
    pub patience: usize,
    /// Minimum MAE decrease that counts as improvement
    pub min_delta: f64,
    /// Base seed for weight init, shuffling and dropout
    pub seed: u64,
    /// Hidden-layer dropout probability
    pub dropout: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            batch_size: 32,
            max_epochs: 500,
            val_every_n_epochs: 10,
            patience: 10,
            min_delta: 0.0,
            seed: 1234,
            dropout: DEFAULT_DROPOUT,
        }
    }
}

impl TrainingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_max_epochs(mut self, epochs: usize) -> Self {
        self.max_epochs = epochs;
        self
    }

    pub fn with_val_every(mut self, epochs: usize) -> Self {
        self.val_every_n_epochs = epochs;
        self
    }

    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    pub fn with_min_delta(mut self, delta: f64) -> Self {
        self.min_delta = delta;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_dropout(mut self, rate: f64) -> Self {
        self.dropout = rate;
        self
    }

    /// Reject values the loop cannot run with. A learning rate of zero is
    /// allowed and freezes the weights.
    pub fn validate(&self) -> Result<()> {
        let invalid = |name: &str, value: String, reason: &str| ChainPerfError::InvalidParameter {
            name: name.to_string(),
            value,
            reason: reason.to_string(),
        };

        if !self.learning_rate.is_finite() || self.learning_rate < 0.0 {
            return Err(invalid("learning_rate", self.learning_rate.to_string(), "must be finite and non-negative"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "0".to_string(), "must be positive"));
        }
        if self.max_epochs == 0 {
            return Err(invalid("max_epochs", "0".to_string(), "must be positive"));
        }
        if self.val_every_n_epochs == 0 {
            return Err(invalid("val_every_n_epochs", "0".to_string(), "must be positive"));
        }
        if !self.min_delta.is_finite() || self.min_delta < 0.0 {
            return Err(invalid("min_delta", self.min_delta.to_string(), "must be finite and non-negative"));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(invalid("dropout", self.dropout.to_string(), "must be in [0, 1)"));
        }
        Ok(())
    }
}

/// Validation result recorded every `val_every_n_epochs` epochs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    pub metrics: MetricsRecord,
}

/// Outcome of a training run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub checkpoints: Vec<Checkpoint>,
    pub epochs_run: usize,
    pub stopped_early: bool,
    pub best_val_mae: Option<f64>,
}

/// MSE loss and metrics of `model` on a whole split, evaluated as one batch
/// in storage order with dropout disabled
pub fn evaluate_model(model: &RegressionModel, data: &WindowedDataset<'_>) -> Result<(f64, MetricsRecord)> {
    let (x, y) = data.full_batch();
    let predictions = model.predict(&x)?;
    let loss = predictions
        .column(0)
        .iter()
        .zip(y.iter())
        .map(|(p, t)| (p - t).powi(2))
        .sum::<f64>()
        / y.len().max(1) as f64;
    let metrics = evaluate(&predictions, &y)?;
    Ok((loss, metrics))
}

/// Drives one model through training on a single fold
#[derive(Debug)]
pub struct TrainingLoop {
    config: TrainingConfig,
    fold: usize,
    rng: ChaCha8Rng,
}

impl TrainingLoop {
    pub fn new(config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Ok(Self { config, fold: 0, rng })
    }

    /// Label log output with `fold` and derive this fold's RNG stream
    pub fn for_fold(mut self, fold: usize) -> Self {
        self.fold = fold;
        self.rng = ChaCha8Rng::seed_from_u64(self.config.seed.wrapping_add(fold as u64));
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train `model` on `train`, validating on `val`.
    ///
    /// The weights left in `model` are the ones from the last epoch run,
    /// not the best checkpoint.
    pub fn fit(
        &mut self,
        model: &mut RegressionModel,
        train: &WindowedDataset<'_>,
        val: &WindowedDataset<'_>,
    ) -> Result<TrainingHistory> {
        if train.is_empty() || val.is_empty() {
            return Err(ChainPerfError::DataError(format!(
                "fold {} has an empty split (train {}, val {})",
                self.fold,
                train.len(),
                val.len()
            )));
        }
        for n_features in [train.n_features(), val.n_features()] {
            if n_features != model.input_dim() {
                return Err(ChainPerfError::ShapeError {
                    expected: format!("{} features", model.input_dim()),
                    actual: format!("{} features", n_features),
                });
            }
        }

        let mut optimizer = Adam::new(self.config.learning_rate);
        let mut stopper = EarlyStopping::new(self.config.patience, self.config.min_delta, StopMode::Min);
        let mut history = TrainingHistory::default();
        let start = Instant::now();

        for epoch in 1..=self.config.max_epochs {
            let train_loss = self.train_epoch(model, &mut optimizer, train, epoch)?;
            history.epochs_run = epoch;
            debug!(fold = self.fold, epoch, train_loss, "Epoch finished");

            if epoch % self.config.val_every_n_epochs != 0 {
                continue;
            }

            let (val_loss, metrics) = evaluate_model(model, val)?;
            if !val_loss.is_finite() || !metrics.is_finite() {
                return Err(ChainPerfError::NumericalError {
                    stage: Stage::Val.to_string(),
                    epoch,
                    detail: format!("validation loss {} with metrics {:?}", val_loss, metrics),
                });
            }
            log_metrics(Stage::Val, self.fold, epoch, val_loss, &metrics);
            history.checkpoints.push(Checkpoint {
                epoch,
                train_loss,
                val_loss,
                metrics,
            });

            if stopper.update(metrics.mae) {
                history.stopped_early = true;
                info!(
                    fold = self.fold,
                    epoch,
                    best_val_mae = stopper.best().unwrap_or(f64::NAN),
                    patience = self.config.patience,
                    "Early stopping: val MAE stopped improving"
                );
                break;
            }
        }

        history.best_val_mae = stopper.best();
        info!(
            fold = self.fold,
            epochs = history.epochs_run,
            stopped_early = history.stopped_early,
            steps = optimizer.steps(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Training finished"
        );
        Ok(history)
    }

    fn train_epoch(
        &mut self,
        model: &mut RegressionModel,
        optimizer: &mut Adam,
        train: &WindowedDataset<'_>,
        epoch: usize,
    ) -> Result<f64> {
        let mut loss_sum = 0.0;
        let mut seen = 0usize;

        for (x, y) in train.batches(self.config.batch_size, Some(&mut self.rng)) {
            let cache = model.forward_train(&x, &mut self.rng)?;
            let (loss, grads) = model.backward(&cache, &y)?;
            if !loss.is_finite() {
                return Err(ChainPerfError::NumericalError {
                    stage: "train".to_string(),
                    epoch,
                    detail: format!("batch loss is {}", loss),
                });
            }
            optimizer.step(model.parameters_mut(), &grads)?;

            loss_sum += loss * y.len() as f64;
            seen += y.len();
        }

        Ok(loss_sum / seen.max(1) as f64)
    }
}
