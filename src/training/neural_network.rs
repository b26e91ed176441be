//! Feed-forward regression network
//!
//! Fixed topology `input -> 128 -> 64 -> 8 -> 1`. Each hidden layer computes
//! `relu(dropout(x @ W + b))`; the output layer is linear. Dropout only runs
//! in the training forward pass, so `predict` is deterministic.

use crate::error::{ChainPerfError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Hidden layer widths
pub const HIDDEN_LAYERS: [usize; 3] = [128, 64, 8];

/// Default dropout probability for hidden layers
pub const DEFAULT_DROPOUT: f64 = 0.1;

fn layer_sizes(input_dim: usize) -> Vec<usize> {
    let mut sizes = Vec::with_capacity(HIDDEN_LAYERS.len() + 2);
    sizes.push(input_dim);
    sizes.extend_from_slice(&HIDDEN_LAYERS);
    sizes.push(1);
    sizes
}

/// Trainable values of a [`RegressionModel`]; this is what gets persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub input_dim: usize,
    pub weights: Vec<Array2<f64>>,
    pub biases: Vec<Array1<f64>>,
}

impl ModelParameters {
    /// Check every tensor against the fixed topology
    pub fn validate(&self) -> Result<()> {
        let sizes = layer_sizes(self.input_dim);
        let n_layers = sizes.len() - 1;
        if self.weights.len() != n_layers || self.biases.len() != n_layers {
            return Err(ChainPerfError::ShapeError {
                expected: format!("{} layers", n_layers),
                actual: format!("{} weights, {} biases", self.weights.len(), self.biases.len()),
            });
        }
        for (i, (w, b)) in self.weights.iter().zip(&self.biases).enumerate() {
            let expected = (sizes[i], sizes[i + 1]);
            if w.dim() != expected || b.len() != sizes[i + 1] {
                return Err(ChainPerfError::ShapeError {
                    expected: format!("layer {} weights {:?}, bias {}", i, expected, sizes[i + 1]),
                    actual: format!("weights {:?}, bias {}", w.dim(), b.len()),
                });
            }
        }
        Ok(())
    }

    pub fn n_parameters(&self) -> usize {
        self.weights.iter().map(|w| w.len()).sum::<usize>()
            + self.biases.iter().map(|b| b.len()).sum::<usize>()
    }

    pub fn all_finite(&self) -> bool {
        self.weights.iter().all(|w| w.iter().all(|v| v.is_finite()))
            && self.biases.iter().all(|b| b.iter().all(|v| v.is_finite()))
    }
}

/// Gradients with the same layout as [`ModelParameters`]
#[derive(Debug, Clone)]
pub struct Gradients {
    pub weights: Vec<Array2<f64>>,
    pub biases: Vec<Array1<f64>>,
}

/// Intermediate values from a training forward pass
#[derive(Debug, Clone)]
pub struct ForwardCache {
    /// Layer inputs: the batch, then each hidden layer's output
    activations: Vec<Array2<f64>>,
    /// Hidden pre-activations after dropout
    pre_activations: Vec<Array2<f64>>,
    /// Scaled dropout masks, `None` when dropout is off
    masks: Vec<Option<Array2<f64>>>,
    output: Array2<f64>,
}

impl ForwardCache {
    /// `(n, 1)` predictions
    pub fn output(&self) -> &Array2<f64> {
        &self.output
    }
}

/// Multi-layer perceptron regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionModel {
    params: ModelParameters,
    dropout: f64,
}

impl RegressionModel {
    /// Fresh model with Xavier-uniform weights and zero biases
    pub fn new(input_dim: usize, seed: u64) -> Result<Self> {
        if input_dim == 0 {
            return Err(ChainPerfError::InvalidParameter {
                name: "input_dim".to_string(),
                value: "0".to_string(),
                reason: "model needs at least one input feature".to_string(),
            });
        }

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let sizes = layer_sizes(input_dim);
        let mut weights = Vec::with_capacity(sizes.len() - 1);
        let mut biases = Vec::with_capacity(sizes.len() - 1);

        for pair in sizes.windows(2) {
            let (n_in, n_out) = (pair[0], pair[1]);
            let scale = (6.0 / (n_in + n_out) as f64).sqrt();
            weights.push(Array2::from_shape_fn((n_in, n_out), |_| {
                rng.gen::<f64>() * 2.0 * scale - scale
            }));
            biases.push(Array1::zeros(n_out));
        }

        Ok(Self {
            params: ModelParameters {
                input_dim,
                weights,
                biases,
            },
            dropout: DEFAULT_DROPOUT,
        })
    }

    /// Rebuild a model from persisted parameters
    pub fn from_parameters(params: ModelParameters) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            dropout: DEFAULT_DROPOUT,
        })
    }

    /// Set the hidden-layer dropout probability, `0.0 <= rate < 1.0`
    pub fn with_dropout(mut self, rate: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&rate) {
            return Err(ChainPerfError::InvalidParameter {
                name: "dropout".to_string(),
                value: rate.to_string(),
                reason: "must be in [0, 1)".to_string(),
            });
        }
        self.dropout = rate;
        Ok(self)
    }

    pub fn input_dim(&self) -> usize {
        self.params.input_dim
    }

    pub fn dropout(&self) -> f64 {
        self.dropout
    }

    pub fn parameters(&self) -> &ModelParameters {
        &self.params
    }

    pub(crate) fn parameters_mut(&mut self) -> &mut ModelParameters {
        &mut self.params
    }

    pub fn into_parameters(self) -> ModelParameters {
        self.params
    }

    fn check_input(&self, x: &Array2<f64>) -> Result<()> {
        if x.ncols() != self.params.input_dim {
            return Err(ChainPerfError::ShapeError {
                expected: format!("{} input features", self.params.input_dim),
                actual: format!("{} input features", x.ncols()),
            });
        }
        Ok(())
    }

    /// Evaluation-mode forward pass, dropout disabled. Returns `(n, 1)`.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_input(x)?;
        let last = self.params.weights.len() - 1;
        let mut a = x.to_owned();
        for (i, (w, b)) in self.params.weights.iter().zip(&self.params.biases).enumerate() {
            let z = a.dot(w) + b;
            a = if i < last { z.mapv(relu) } else { z };
        }
        Ok(a)
    }

    /// Training-mode forward pass with dropout masks drawn from `rng`
    pub fn forward_train<R: Rng + ?Sized>(&self, x: &Array2<f64>, rng: &mut R) -> Result<ForwardCache> {
        self.check_input(x)?;
        let last = self.params.weights.len() - 1;
        let keep_scale = 1.0 / (1.0 - self.dropout);

        let mut activations = vec![x.to_owned()];
        let mut pre_activations = Vec::with_capacity(last);
        let mut masks = Vec::with_capacity(last);
        let mut output = Array2::zeros((x.nrows(), 1));

        for (i, (w, b)) in self.params.weights.iter().zip(&self.params.biases).enumerate() {
            let z = activations[i].dot(w) + b;
            if i == last {
                output = z;
                break;
            }

            let (dropped, mask) = if self.dropout > 0.0 {
                let mask = Array2::from_shape_fn(z.raw_dim(), |_| {
                    if rng.gen::<f64>() < self.dropout { 0.0 } else { keep_scale }
                });
                (&z * &mask, Some(mask))
            } else {
                (z, None)
            };

            activations.push(dropped.mapv(relu));
            pre_activations.push(dropped);
            masks.push(mask);
        }

        Ok(ForwardCache {
            activations,
            pre_activations,
            masks,
            output,
        })
    }

    /// MSE loss of a training forward pass and its gradients
    pub fn backward(&self, cache: &ForwardCache, targets: &Array1<f64>) -> Result<(f64, Gradients)> {
        let n = targets.len();
        if cache.output.nrows() != n {
            return Err(ChainPerfError::ShapeError {
                expected: format!("{} targets", cache.output.nrows()),
                actual: format!("{} targets", n),
            });
        }

        let y = targets.view().insert_axis(Axis(1));
        let diff = &cache.output - &y;
        let loss = diff.mapv(|d| d * d).sum() / n as f64;

        let n_layers = self.params.weights.len();
        let mut grad_w = Vec::with_capacity(n_layers);
        let mut grad_b = Vec::with_capacity(n_layers);

        let mut delta = diff * (2.0 / n as f64);
        for i in (0..n_layers).rev() {
            grad_w.push(cache.activations[i].t().dot(&delta));
            grad_b.push(delta.sum_axis(Axis(0)));

            if i > 0 {
                let upstream = delta.dot(&self.params.weights[i].t());
                let mut d = upstream * cache.pre_activations[i - 1].mapv(relu_derivative);
                if let Some(mask) = &cache.masks[i - 1] {
                    d = d * mask;
                }
                delta = d;
            }
        }

        grad_w.reverse();
        grad_b.reverse();
        Ok((
            loss,
            Gradients {
                weights: grad_w,
                biases: grad_b,
            },
        ))
    }
}

fn relu(v: f64) -> f64 {
    v.max(0.0)
}

fn relu_derivative(v: f64) -> f64 {
    if v > 0.0 { 1.0 } else { 0.0 }
}
