//! Cross-validation result table

use crate::data::Task;
use crate::error::{ChainPerfError, Result};
use crate::training::MetricsRecord;
use polars::prelude::{CsvWriter, DataFrame, NamedFrom, SerWriter, Series};
use std::fs::File;
use std::path::Path;

/// Build the result frame: one column per metric, named after the task
pub fn results_frame(task: Task, rows: &[MetricsRecord]) -> Result<DataFrame> {
    let [mae_col, rmse_col, mape_col] = task.metric_columns();
    let mae: Vec<f64> = rows.iter().map(|r| r.mae).collect();
    let rmse: Vec<f64> = rows.iter().map(|r| r.rmse).collect();
    let mape: Vec<f64> = rows.iter().map(|r| r.mape).collect();

    let df = DataFrame::new(vec![
        Series::new(mae_col.as_str().into(), mae).into(),
        Series::new(rmse_col.as_str().into(), rmse).into(),
        Series::new(mape_col.as_str().into(), mape).into(),
    ])?;
    Ok(df)
}

/// Write rows (folds, then mean, then std) to `path` with a header line
pub fn write_results_csv(path: impl AsRef<Path>, task: Task, rows: &[MetricsRecord]) -> Result<()> {
    if rows.is_empty() {
        return Err(ChainPerfError::DataError("no result rows to write".to_string()));
    }
    let mut df = results_frame(task, rows)?;
    let mut file = File::create(path.as_ref())?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Ensemble_result.csv");
        let rows = vec![
            MetricsRecord::new(1.0, 2.0, 0.5),
            MetricsRecord::new(3.0, 4.0, 0.25),
        ];
        write_results_csv(&path, Task::Latency, &rows).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "latency_MAE,latency_RMSE,latency_MAPE");
        assert_eq!(lines.len(), 3);

        let values: Vec<f64> = lines[2].split(',').map(|v| v.parse().unwrap()).collect();
        assert_eq!(values, vec![3.0, 4.0, 0.25]);
    }

    #[test]
    fn test_empty_rows_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_results_csv(dir.path().join("r.csv"), Task::Throughput, &[]).is_err());
    }
}
