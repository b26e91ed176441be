//! Model training
//!
//! - [`neural_network`]: the fixed-topology MLP regressor
//! - [`optimizer`]: Adam
//! - [`trainer`]: the mini-batch loop with periodic validation
//! - [`early_stopping`]: patience tracking on val MAE
//! - [`metrics`]: MAE/RMSE/MAPE and the fold table
//! - [`cross_validation`]: shuffled K-fold splitting
//! - [`ensemble`]: the per-fold orchestration

pub mod cross_validation;
pub mod early_stopping;
pub mod ensemble;
pub mod metrics;
pub mod neural_network;
pub mod optimizer;
pub mod trainer;

pub use cross_validation::{FoldSplit, KFold, FOLD_COUNT};
pub use early_stopping::{EarlyStopping, StopMode};
pub use ensemble::{CrossValidationOrchestrator, EnsembleConfig, EnsembleReport, FoldReport};
pub use metrics::{collapse_predictions, evaluate, MetricsRecord, MetricsTable, Stage};
pub use neural_network::{ForwardCache, Gradients, ModelParameters, RegressionModel};
pub use optimizer::Adam;
pub use trainer::{evaluate_model, Checkpoint, TrainingConfig, TrainingHistory, TrainingLoop};
