//! Persisted artifacts
//!
//! - Per-fold model checkpoints (`Ensemble<k>.ckpt`, parameters only)
//! - The per-run result table (`Ensemble_result.csv`)

mod results;
mod serializer;

pub use results::{results_frame, write_results_csv};
pub use serializer::{load_checkpoint, save_checkpoint, ModelMetadata};
