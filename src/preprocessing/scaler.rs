//! Min-max feature scaling

use crate::error::{ChainPerfError, Result};
use ndarray::{Array1, Array2, Axis, Zip};
use serde::{Deserialize, Serialize};

/// Per-column minimum and maximum observed on a train split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    pub min: Array1<f64>,
    pub max: Array1<f64>,
}

impl ScalerState {
    pub fn n_features(&self) -> usize {
        self.min.len()
    }

    /// `max - min` per column; zero marks a constant column
    pub fn range(&self) -> Array1<f64> {
        &self.max - &self.min
    }
}

/// Maps each column to `[0, 1]` using train-split min and max.
///
/// A column that is constant on the train split has no usable range; every
/// value in that column is mapped to `0.0`, for train and test data alike.
/// Test values outside the train range are left unclipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinMaxScaler;

impl MinMaxScaler {
    pub fn new() -> Self {
        Self
    }

    /// Learn min/max from `train`
    pub fn fit(&self, train: &Array2<f64>) -> Result<ScalerState> {
        if train.nrows() == 0 {
            return Err(ChainPerfError::DataError(
                "cannot fit scaler on an empty matrix".to_string(),
            ));
        }
        let min = train.fold_axis(Axis(0), f64::INFINITY, |&a, &b| a.min(b));
        let max = train.fold_axis(Axis(0), f64::NEG_INFINITY, |&a, &b| a.max(b));
        Ok(ScalerState { min, max })
    }

    /// Fit on `train` and return the scaled copy together with the state
    pub fn fit_transform(&self, train: &Array2<f64>) -> Result<(Array2<f64>, ScalerState)> {
        let state = self.fit(train)?;
        let scaled = self.transform(train, &state)?;
        Ok((scaled, state))
    }

    /// Apply a previously fitted state; never refits
    pub fn transform(&self, x: &Array2<f64>, state: &ScalerState) -> Result<Array2<f64>> {
        if x.ncols() != state.n_features() {
            return Err(ChainPerfError::ShapeError {
                expected: format!("{} columns", state.n_features()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let range = state.range();
        let mut out = x.to_owned();
        for mut row in out.rows_mut() {
            Zip::from(&mut row)
                .and(&state.min)
                .and(&range)
                .for_each(|v, &min, &r| {
                    *v = if r == 0.0 { 0.0 } else { (*v - min) / r };
                });
        }
        Ok(out)
    }

    /// Undo `transform`. Constant columns come back as their train value.
    pub fn inverse_transform(&self, x: &Array2<f64>, state: &ScalerState) -> Result<Array2<f64>> {
        if x.ncols() != state.n_features() {
            return Err(ChainPerfError::ShapeError {
                expected: format!("{} columns", state.n_features()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let range = state.range();
        let mut out = x.to_owned();
        for mut row in out.rows_mut() {
            Zip::from(&mut row)
                .and(&state.min)
                .and(&range)
                .for_each(|v, &min, &r| *v = *v * r + min);
        }
        Ok(out)
    }
}
