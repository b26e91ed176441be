//! Regression metrics and the per-fold results table

use crate::error::{ChainPerfError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Where a metric was computed. Only used to label log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Val,
    Test,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Val => "val",
            Stage::Test => "test",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// MAE, RMSE and MAPE for one split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub mae: f64,
    pub rmse: f64,
    /// Fraction, not percent
    pub mape: f64,
}

impl MetricsRecord {
    pub fn new(mae: f64, rmse: f64, mape: f64) -> Self {
        Self { mae, rmse, mape }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.mae, self.rmse, self.mape]
    }

    pub fn is_finite(&self) -> bool {
        self.as_array().iter().all(|v| v.is_finite())
    }
}

/// Average model outputs per record, giving one prediction per row.
/// A single-output model passes through unchanged.
pub fn collapse_predictions(predictions: &Array2<f64>) -> Result<Array1<f64>> {
    if predictions.ncols() == 0 {
        return Err(ChainPerfError::ShapeError {
            expected: "at least one prediction column".to_string(),
            actual: "0 columns".to_string(),
        });
    }
    predictions.mean_axis(Axis(1)).ok_or_else(|| ChainPerfError::ShapeError {
        expected: "non-empty predictions".to_string(),
        actual: format!("{:?}", predictions.dim()),
    })
}

/// Compute MAE, RMSE and MAPE of `predictions` against `targets`.
///
/// MAPE divides by `max(|y|, f64::EPSILON)`, so a zero target yields a
/// large but finite term instead of a division by zero.
pub fn evaluate(predictions: &Array2<f64>, targets: &Array1<f64>) -> Result<MetricsRecord> {
    let y_hat = collapse_predictions(predictions)?;
    if y_hat.len() != targets.len() {
        return Err(ChainPerfError::ShapeError {
            expected: format!("{} predictions", targets.len()),
            actual: format!("{} predictions", y_hat.len()),
        });
    }
    if targets.is_empty() {
        return Err(ChainPerfError::DataError("cannot evaluate on an empty split".to_string()));
    }

    let n = targets.len() as f64;
    let mut abs_sum = 0.0;
    let mut sq_sum = 0.0;
    let mut pct_sum = 0.0;
    for (&y, &p) in targets.iter().zip(y_hat.iter()) {
        let err = (y - p).abs();
        abs_sum += err;
        sq_sum += err * err;
        pct_sum += err / y.abs().max(f64::EPSILON);
    }

    Ok(MetricsRecord {
        mae: abs_sum / n,
        rmse: (sq_sum / n).sqrt(),
        mape: pct_sum / n,
    })
}

/// Emit a metrics event tagged with its stage
pub fn log_metrics(stage: Stage, fold: usize, epoch: usize, loss: f64, metrics: &MetricsRecord) {
    info!(
        stage = %stage,
        fold,
        epoch,
        loss,
        mae = metrics.mae,
        rmse = metrics.rmse,
        mape = metrics.mape,
        "{} metrics", stage
    );
}

/// One metrics row per fold, plus mean and standard deviation on demand
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsTable {
    rows: Vec<MetricsRecord>,
}

impl MetricsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: MetricsRecord) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[MetricsRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column-wise mean and population standard deviation (ddof = 0)
    pub fn aggregate(&self) -> Result<(MetricsRecord, MetricsRecord)> {
        if self.rows.is_empty() {
            return Err(ChainPerfError::DataError("no fold metrics to aggregate".to_string()));
        }
        let matrix = self.to_array();
        let mean = matrix
            .mean_axis(Axis(0))
            .ok_or_else(|| ChainPerfError::DataError("no fold metrics to aggregate".to_string()))?;
        let std = matrix.std_axis(Axis(0), 0.0);

        Ok((
            MetricsRecord::new(mean[0], mean[1], mean[2]),
            MetricsRecord::new(std[0], std[1], std[2]),
        ))
    }

    /// Fold rows as an `(n_folds, 3)` matrix
    pub fn to_array(&self) -> Array2<f64> {
        let mut out = Array2::zeros((self.rows.len(), 3));
        for (i, row) in self.rows.iter().enumerate() {
            out.row_mut(i).assign(&Array1::from(row.as_array().to_vec()));
        }
        out
    }

    /// Fold rows followed by the mean row and the std row
    pub fn with_summary(&self) -> Result<Vec<MetricsRecord>> {
        let (mean, std) = self.aggregate()?;
        let mut rows = self.rows.clone();
        rows.push(mean);
        rows.push(std);
        Ok(rows)
    }
}
