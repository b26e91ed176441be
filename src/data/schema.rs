//! Per-dataset column schemas
//!
//! Each supported dataset stores its features and targets at fixed
//! positions. The registry maps a `(dataset, task)` pair to the columns to
//! select and refuses unknown pairs instead of guessing.

use crate::error::{ChainPerfError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Prediction target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Task {
    /// Transactions per second
    Throughput,
    /// Confirmation latency
    Latency,
}

impl Task {
    /// Name as used in directory paths and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Throughput => "Throughput",
            Task::Latency => "Latency",
        }
    }

    /// Result column names, e.g. `throughput_MAE`
    pub fn metric_columns(&self) -> [String; 3] {
        let prefix = self.as_str().to_lowercase();
        [
            format!("{}_MAE", prefix),
            format!("{}_RMSE", prefix),
            format!("{}_MAPE", prefix),
        ]
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Task {
    type Err = ChainPerfError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Throughput" => Ok(Task::Throughput),
            "Latency" => Ok(Task::Latency),
            other => Err(ChainPerfError::ConfigError(format!(
                "unknown task '{}', expected 'Throughput' or 'Latency'",
                other
            ))),
        }
    }
}

/// Positional column reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnIndex {
    /// Zero-based index from the first column
    Start(usize),
    /// One-based offset from the last column (`End(1)` is the last column)
    End(usize),
}

impl ColumnIndex {
    /// Resolve against a table with `width` columns
    pub fn resolve(&self, width: usize) -> Result<usize> {
        let resolved = match *self {
            ColumnIndex::Start(i) if i < width => Some(i),
            ColumnIndex::End(k) if k >= 1 && k <= width => Some(width - k),
            _ => None,
        };
        resolved.ok_or_else(|| {
            ChainPerfError::DataError(format!(
                "column {:?} does not exist in a table with {} columns",
                self, width
            ))
        })
    }
}

/// Columns to pull out of a raw table for one dataset/task pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSelection {
    pub features: Vec<ColumnIndex>,
    pub target: ColumnIndex,
    /// Minimum column count the CSV must have
    pub min_columns: usize,
}

impl ColumnSelection {
    pub fn new(features: Vec<ColumnIndex>, target: ColumnIndex, min_columns: usize) -> Self {
        Self {
            features,
            target,
            min_columns,
        }
    }

    /// Model input dimensionality
    pub fn input_dim(&self) -> usize {
        self.features.len()
    }

    /// Resolve feature and target indices against a table width
    pub fn resolve(&self, width: usize) -> Result<(Vec<usize>, usize)> {
        if width < self.min_columns {
            return Err(ChainPerfError::DataError(format!(
                "expected at least {} columns, found {}",
                self.min_columns, width
            )));
        }
        let features = self
            .features
            .iter()
            .map(|c| c.resolve(width))
            .collect::<Result<Vec<_>>>()?;
        let target = self.target.resolve(width)?;
        Ok((features, target))
    }
}

/// Lookup table keyed by `(dataset, task)`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaRegistry {
    entries: HashMap<String, HashMap<Task, ColumnSelection>>,
}

impl SchemaRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the BPD-1, HFBTP and MMBPD layouts
    pub fn builtin() -> Self {
        use ColumnIndex::{End, Start};

        let mut registry = Self::new();

        let bpd_features = vec![Start(0), Start(1)];
        registry.register("BPD-1", Task::Latency, ColumnSelection::new(bpd_features.clone(), Start(2), 4));
        registry.register("BPD-1", Task::Throughput, ColumnSelection::new(bpd_features, Start(3), 4));

        let hfbtp_features = vec![Start(0), Start(1), Start(2)];
        registry.register("HFBTP", Task::Latency, ColumnSelection::new(hfbtp_features.clone(), Start(4), 5));
        registry.register("HFBTP", Task::Throughput, ColumnSelection::new(hfbtp_features, Start(3), 5));

        let mmbpd_features = vec![Start(1), Start(2)];
        registry.register("MMBPD", Task::Latency, ColumnSelection::new(mmbpd_features.clone(), Start(4), 5));
        registry.register("MMBPD", Task::Throughput, ColumnSelection::new(mmbpd_features, End(2), 5));

        registry
    }

    /// Add or replace an entry
    pub fn register(&mut self, dataset: impl Into<String>, task: Task, selection: ColumnSelection) {
        self.entries
            .entry(dataset.into())
            .or_default()
            .insert(task, selection);
    }

    /// Look up the columns for a dataset/task pair
    pub fn lookup(&self, dataset: &str, task: Task) -> Result<&ColumnSelection> {
        self.entries
            .get(dataset)
            .and_then(|tasks| tasks.get(&task))
            .ok_or_else(|| {
                ChainPerfError::ConfigError(format!(
                    "no column schema for dataset '{}' and task '{}'",
                    dataset, task
                ))
            })
    }

    /// Registered dataset names, sorted
    pub fn datasets(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
