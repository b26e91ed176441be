//! Adam optimizer over all model parameters

use super::neural_network::{Gradients, ModelParameters};
use crate::error::{ChainPerfError, Result};
use ndarray::{Array1, Array2, Zip};

/// Adaptive moment estimation with bias correction.
///
/// Holds one first/second moment pair per parameter tensor and a single
/// step counter shared by all of them. State lives only for one fold's
/// training and is never persisted.
#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    t: i32,
    m_w: Vec<Array2<f64>>,
    v_w: Vec<Array2<f64>>,
    m_b: Vec<Array1<f64>>,
    v_b: Vec<Array1<f64>>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            t: 0,
            m_w: Vec::new(),
            v_w: Vec::new(),
            m_b: Vec::new(),
            v_b: Vec::new(),
        }
    }

    pub fn with_betas(mut self, beta1: f64, beta2: f64) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    /// Number of updates applied so far
    pub fn steps(&self) -> i32 {
        self.t
    }

    fn ensure_state(&mut self, params: &ModelParameters) {
        if self.m_w.len() == params.weights.len() {
            return;
        }
        self.m_w = params.weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect();
        self.v_w = self.m_w.clone();
        self.m_b = params.biases.iter().map(|b| Array1::zeros(b.raw_dim())).collect();
        self.v_b = self.m_b.clone();
    }

    /// Apply one update to every tensor in `params`
    pub fn step(&mut self, params: &mut ModelParameters, grads: &Gradients) -> Result<()> {
        if grads.weights.len() != params.weights.len() || grads.biases.len() != params.biases.len() {
            return Err(ChainPerfError::ShapeError {
                expected: format!("{} gradient tensors", params.weights.len()),
                actual: format!("{}", grads.weights.len()),
            });
        }
        self.ensure_state(params);
        self.t += 1;

        let (b1, b2, eps, lr) = (self.beta1, self.beta2, self.epsilon, self.learning_rate);
        let c1 = 1.0 - b1.powi(self.t);
        let c2 = 1.0 - b2.powi(self.t);
        let update = move |p: &mut f64, m: &mut f64, v: &mut f64, &g: &f64| {
            *m = b1 * *m + (1.0 - b1) * g;
            *v = b2 * *v + (1.0 - b2) * g * g;
            let m_hat = *m / c1;
            let v_hat = *v / c2;
            *p -= lr * m_hat / (v_hat.sqrt() + eps);
        };

        for i in 0..params.weights.len() {
            Zip::from(&mut params.weights[i])
                .and(&mut self.m_w[i])
                .and(&mut self.v_w[i])
                .and(&grads.weights[i])
                .for_each(update);
            Zip::from(&mut params.biases[i])
                .and(&mut self.m_b[i])
                .and(&mut self.v_b[i])
                .and(&grads.biases[i])
                .for_each(update);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::neural_network::RegressionModel;

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        let mut params = RegressionModel::new(2, 0).unwrap().into_parameters();
        let before = params.clone();
        let grads = Gradients {
            weights: params.weights.iter().map(|w| w.mapv(|_| 0.5)).collect(),
            biases: params.biases.iter().map(|b| b.mapv(|_| -2.0)).collect(),
        };

        let mut adam = Adam::new(0.01);
        adam.step(&mut params, &grads).unwrap();
        assert_eq!(adam.steps(), 1);

        // bias-corrected first step is lr * sign(g)
        let dw = before.weights[0][[0, 0]] - params.weights[0][[0, 0]];
        assert!((dw - 0.01).abs() < 1e-6);
        let db = params.biases[2][0] - before.biases[2][0];
        assert!((db - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_minimizes_quadratic() {
        // drive every parameter towards 1.0 with grad = 2 (p - 1)
        let mut params = RegressionModel::new(1, 4).unwrap().into_parameters();
        let mut adam = Adam::new(0.05);
        for _ in 0..1000 {
            let grads = Gradients {
                weights: params.weights.iter().map(|w| w.mapv(|p| 2.0 * (p - 1.0))).collect(),
                biases: params.biases.iter().map(|b| b.mapv(|p| 2.0 * (p - 1.0))).collect(),
            };
            adam.step(&mut params, &grads).unwrap();
        }
        assert!(params.weights.iter().flat_map(|w| w.iter()).all(|p| (p - 1.0).abs() < 0.1));
    }

    #[test]
    fn test_mismatched_gradients() {
        let mut params = RegressionModel::new(2, 0).unwrap().into_parameters();
        let grads = Gradients { weights: vec![], biases: vec![] };
        assert!(Adam::new(0.001).step(&mut params, &grads).is_err());
    }
}
