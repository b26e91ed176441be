//! CSV loading and column selection

use crate::data::schema::ColumnSelection;
use crate::error::{ChainPerfError, Result};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::{CsvReadOptions, DataFrame, DataType, SerReader};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Feature matrix and target vector, read once and shared read-only by all folds
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Array2<f64>,
    targets: Array1<f64>,
}

impl Dataset {
    /// Pair a feature matrix with its targets. Row counts must match.
    pub fn new(features: Array2<f64>, targets: Array1<f64>) -> Result<Self> {
        if features.nrows() != targets.len() {
            return Err(ChainPerfError::ShapeError {
                expected: format!("{} targets", features.nrows()),
                actual: format!("{} targets", targets.len()),
            });
        }
        if features.nrows() == 0 {
            return Err(ChainPerfError::DataError("dataset has no records".to_string()));
        }
        Ok(Self { features, targets })
    }

    /// Select feature and target columns from a loaded table
    pub fn from_frame(df: &DataFrame, selection: &ColumnSelection) -> Result<Self> {
        let (feature_idx, target_idx) = selection.resolve(df.width())?;
        let n_rows = df.height();

        let mut features = Array2::zeros((n_rows, feature_idx.len()));
        for (j, &col) in feature_idx.iter().enumerate() {
            let values = column_values(df, col)?;
            features.column_mut(j).assign(&Array1::from(values));
        }
        let targets = Array1::from(column_values(df, target_idx)?);

        Self::new(features, targets)
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn targets(&self) -> &Array1<f64> {
        &self.targets
    }

    pub fn n_records(&self) -> usize {
        self.targets.len()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Copy out the rows at `indices`, in that order
    pub fn select(&self, indices: &[usize]) -> Result<(Array2<f64>, Array1<f64>)> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_records()) {
            return Err(ChainPerfError::IndexOutOfBounds {
                index: bad,
                len: self.n_records(),
            });
        }
        Ok((
            self.features.select(Axis(0), indices),
            self.targets.select(Axis(0), indices),
        ))
    }
}

fn column_values(df: &DataFrame, idx: usize) -> Result<Vec<f64>> {
    let column = &df.get_columns()[idx];
    let name = column.name().to_string();
    let series = column.as_materialized_series().cast(&DataType::Float64)?;
    let ca = series.f64()?;

    ca.into_iter()
        .enumerate()
        .map(|(row, value)| match value {
            Some(v) if v.is_finite() => Ok(v),
            _ => Err(ChainPerfError::DataError(format!(
                "column '{}' row {} is missing or not a finite number",
                name, row
            ))),
        })
        .collect()
}

/// CSV reader for the benchmark datasets
#[derive(Debug, Clone)]
pub struct DataLoader {
    data_dir: PathBuf,
    infer_schema_length: usize,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new("../data")
    }
}

impl DataLoader {
    /// Loader rooted at `data_dir`; dataset `X` is read from `<data_dir>/X.csv`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            infer_schema_length: 1000,
        }
    }

    pub fn with_infer_schema_length(mut self, rows: usize) -> Self {
        self.infer_schema_length = rows;
        self
    }

    /// Path of the CSV for a dataset name
    pub fn dataset_path(&self, dataset: &str) -> PathBuf {
        self.data_dir.join(format!("{}.csv", dataset))
    }

    /// Read a CSV with a header row
    pub fn load_csv(&self, path: &Path) -> Result<DataFrame> {
        let file = File::open(path).map_err(|e| {
            ChainPerfError::DataError(format!("cannot open {}: {}", path.display(), e))
        })?;

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .into_reader_with_file_handle(file)
            .finish()?;

        if df.height() == 0 {
            return Err(ChainPerfError::DataError(format!(
                "{} contains no records",
                path.display()
            )));
        }
        Ok(df)
    }

    /// Load a dataset by name and select its columns
    pub fn load_dataset(&self, dataset: &str, selection: &ColumnSelection) -> Result<Dataset> {
        let path = self.dataset_path(dataset);
        let start = Instant::now();
        let df = self.load_csv(&path)?;
        debug!(path = %path.display(), rows = df.height(), cols = df.width(), "CSV parsed");

        let data = Dataset::from_frame(&df, selection)?;
        info!(
            dataset,
            records = data.n_records(),
            features = data.n_features(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Dataset loaded"
        );
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::schema::{SchemaRegistry, Task};
    use ndarray::array;

    fn mmbpd_frame() -> DataFrame {
        polars::df!(
            "id" => &[1.0, 2.0, 3.0],
            "block_size" => &[10.0, 20.0, 30.0],
            "tx_rate" => &[100.0, 200.0, 300.0],
            "extra" => &[0.0, 0.0, 0.0],
            "latency" => &[1.5, 2.5, 3.5],
            "throughput" => &[50.0, 60.0, 70.0],
            "tail" => &[9.0, 9.0, 9.0]
        )
        .unwrap()
    }

    #[test]
    fn test_from_frame_selects_columns() {
        let registry = SchemaRegistry::builtin();
        let df = mmbpd_frame();

        let throughput = Dataset::from_frame(&df, registry.lookup("MMBPD", Task::Throughput).unwrap()).unwrap();
        assert_eq!(throughput.features(), &array![[10.0, 100.0], [20.0, 200.0], [30.0, 300.0]]);
        assert_eq!(throughput.targets(), &array![50.0, 60.0, 70.0]);

        let latency = Dataset::from_frame(&df, registry.lookup("MMBPD", Task::Latency).unwrap()).unwrap();
        assert_eq!(latency.targets(), &array![1.5, 2.5, 3.5]);
    }

    #[test]
    fn test_select_rows() {
        let data = Dataset::new(array![[1.0], [2.0], [3.0]], array![10.0, 20.0, 30.0]).unwrap();
        let (x, y) = data.select(&[2, 0]).unwrap();
        assert_eq!(x, array![[3.0], [1.0]]);
        assert_eq!(y, array![30.0, 10.0]);
        assert!(matches!(
            data.select(&[3]),
            Err(ChainPerfError::IndexOutOfBounds { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_mismatched_lengths() {
        let err = Dataset::new(array![[1.0], [2.0]], array![1.0]).unwrap_err();
        assert!(matches!(err, ChainPerfError::ShapeError { .. }));
    }

    #[test]
    fn test_missing_file_is_data_error() {
        let loader = DataLoader::new("/nonexistent/dir");
        let selection = SchemaRegistry::builtin().lookup("BPD-1", Task::Latency).unwrap().clone();
        let err = loader.load_dataset("BPD-1", &selection).unwrap_err();
        assert!(matches!(err, ChainPerfError::DataError(_)));
    }
}
