//! ChainPerf - blockchain performance prediction
//!
//! Predicts throughput or latency of a blockchain system from its
//! configuration and workload parameters. Every run trains a five-member
//! MLP ensemble with shuffled 5-fold cross-validation, stores one
//! checkpoint per member and reports held-out MAE, RMSE and MAPE.
//!
//! # Modules
//!
//! - [`data`] - Dataset schemas, CSV loading, batch iteration
//! - [`preprocessing`] - Per-fold min-max scaling
//! - [`training`] - The network, Adam, the training loop, K-fold orchestration
//! - [`export`] - Checkpoints and the result table
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Pipeline
pub mod data;
pub mod preprocessing;
pub mod training;
pub mod export;

// Services
pub mod cli;

pub use error::{ChainPerfError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{ChainPerfError, Result};

    // Data
    pub use crate::data::{ColumnSelection, DataLoader, Dataset, SchemaRegistry, Task, WindowedDataset};

    // Preprocessing
    pub use crate::preprocessing::{MinMaxScaler, ScalerState};

    // Training
    pub use crate::training::{
        CrossValidationOrchestrator, EnsembleConfig, EnsembleReport, KFold, MetricsRecord,
        RegressionModel, TrainingConfig, TrainingLoop,
    };

    // Export
    pub use crate::export::{load_checkpoint, save_checkpoint, ModelMetadata};
}
