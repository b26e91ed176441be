//! Patience-based early stopping on a monitored metric

use serde::{Deserialize, Serialize};

/// Direction in which the monitored value improves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopMode {
    Min,
    Max,
}

/// Stops once the monitored value fails to improve by more than
/// `min_delta` for `patience` consecutive checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarlyStopping {
    patience: usize,
    min_delta: f64,
    mode: StopMode,
    best: Option<f64>,
    wait: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize, min_delta: f64, mode: StopMode) -> Self {
        Self {
            patience,
            min_delta: min_delta.abs(),
            mode,
            best: None,
            wait: 0,
        }
    }

    fn improves(&self, value: f64, best: f64) -> bool {
        match self.mode {
            StopMode::Min => value < best - self.min_delta,
            StopMode::Max => value > best + self.min_delta,
        }
    }

    /// Record a check. Returns `true` when training should stop.
    pub fn update(&mut self, value: f64) -> bool {
        match self.best {
            Some(best) if !self.improves(value, best) => {
                self.wait += 1;
            }
            _ => {
                self.best = Some(value);
                self.wait = 0;
            }
        }
        self.wait >= self.patience
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    /// Consecutive checks without improvement
    pub fn wait_count(&self) -> usize {
        self.wait
    }

    pub fn reset(&mut self) {
        self.best = None;
        self.wait = 0;
    }
}
