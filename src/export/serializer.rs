//! Checkpoint files holding trained model parameters
//!
//! A checkpoint stores the network's weights and biases plus a little
//! descriptive metadata. Optimizer state and training history are never
//! written.

use crate::data::Task;
use crate::error::{ChainPerfError, Result};
use crate::training::{ModelParameters, RegressionModel};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::debug;

/// Describes which run and fold produced a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub dataset: String,
    pub task: Task,
    /// One-based ensemble member index
    pub member: usize,
    pub input_dim: usize,
    /// RFC 3339 timestamp
    pub trained_at: String,
}

impl ModelMetadata {
    pub fn new(dataset: impl Into<String>, task: Task, member: usize, input_dim: usize) -> Self {
        Self {
            dataset: dataset.into(),
            task,
            member,
            input_dim,
            trained_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// On-disk layout of a `.ckpt` file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelCheckpoint {
    magic: [u8; 4],
    format_version: u32,
    metadata: ModelMetadata,
    /// bincode-encoded [`ModelParameters`]
    model_data: Vec<u8>,
    checksum: u64,
}

impl ModelCheckpoint {
    const MAGIC: [u8; 4] = *b"CPMD";
    const VERSION: u32 = 1;

    fn new(metadata: ModelMetadata, model_data: Vec<u8>) -> Self {
        let checksum = Self::compute_checksum(&model_data);
        Self {
            magic: Self::MAGIC,
            format_version: Self::VERSION,
            metadata,
            model_data,
            checksum,
        }
    }

    /// FNV-1a over the parameter bytes
    fn compute_checksum(data: &[u8]) -> u64 {
        const FNV_OFFSET: u64 = 14695981039346656037;
        const FNV_PRIME: u64 = 1099511628211;

        let mut hash = FNV_OFFSET;
        for byte in data {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }

    fn verify(&self) -> Result<()> {
        if self.magic != Self::MAGIC {
            return Err(ChainPerfError::SerializationError(
                "not a chainperf checkpoint (bad magic bytes)".to_string(),
            ));
        }
        if self.format_version != Self::VERSION {
            return Err(ChainPerfError::SerializationError(format!(
                "unsupported checkpoint version {}",
                self.format_version
            )));
        }
        if Self::compute_checksum(&self.model_data) != self.checksum {
            return Err(ChainPerfError::SerializationError(
                "checksum verification failed - file may be corrupted".to_string(),
            ));
        }
        Ok(())
    }
}

/// Write `model`'s parameters to `path`
pub fn save_checkpoint(model: &RegressionModel, metadata: ModelMetadata, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let model_data = bincode::serialize(model.parameters())?;
    let checkpoint = ModelCheckpoint::new(metadata, model_data);

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    bincode::serialize_into(&mut writer, &checkpoint)?;
    writer.flush()?;

    debug!(path = %path.display(), bytes = checkpoint.model_data.len(), "Checkpoint written");
    Ok(())
}

/// Read a checkpoint back into a model ready for evaluation
pub fn load_checkpoint(path: impl AsRef<Path>) -> Result<(RegressionModel, ModelMetadata)> {
    let mut bytes = Vec::new();
    BufReader::new(File::open(path.as_ref())?).read_to_end(&mut bytes)?;
    if !bytes.starts_with(&ModelCheckpoint::MAGIC) {
        return Err(ChainPerfError::SerializationError(
            "not a chainperf checkpoint (bad magic bytes)".to_string(),
        ));
    }

    let checkpoint: ModelCheckpoint = bincode::deserialize(&bytes)?;
    checkpoint.verify()?;

    let params: ModelParameters = bincode::deserialize(&checkpoint.model_data)?;
    if params.input_dim != checkpoint.metadata.input_dim {
        return Err(ChainPerfError::SerializationError(format!(
            "metadata says {} inputs but parameters have {}",
            checkpoint.metadata.input_dim, params.input_dim
        )));
    }
    let model = RegressionModel::from_parameters(params)?;
    Ok((model, checkpoint.metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_checkpoint_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Ensemble1.ckpt");

        let model = RegressionModel::new(2, 11).unwrap();
        let metadata = ModelMetadata::new("MMBPD", Task::Throughput, 1, 2);
        save_checkpoint(&model, metadata.clone(), &path).unwrap();

        let (restored, meta) = load_checkpoint(&path).unwrap();
        assert_eq!(meta, metadata);
        assert_eq!(restored.parameters(), model.parameters());

        let x = array![[0.1, 0.2], [0.9, 0.4]];
        assert_eq!(restored.predict(&x).unwrap(), model.predict(&x).unwrap());
    }

    #[test]
    fn test_corrupted_checkpoint_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Ensemble2.ckpt");
        let model = RegressionModel::new(3, 5).unwrap();
        save_checkpoint(&model, ModelMetadata::new("HFBTP", Task::Latency, 2, 3), &path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 20;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        assert!(load_checkpoint(&path).is_err());
    }

    #[test]
    fn test_garbage_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.ckpt");
        std::fs::write(&path, b"definitely not a checkpoint").unwrap();
        assert!(matches!(
            load_checkpoint(&path),
            Err(ChainPerfError::SerializationError(_))
        ));
    }
}
