//! Missing-value counts before and after imputation

use crate::data::NumericMatrix;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMissing {
    pub column: String,
    pub missing: usize,
    pub fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingnessReport {
    pub rows: usize,
    pub columns: Vec<ColumnMissing>,
    /// Records with at least one missing eligible cell before imputation
    pub flagged_records_before: usize,
    /// Same count on the completed matrix; equal to `before` when no
    /// imputation ran
    pub flagged_records_after: usize,
}

impl MissingnessReport {
    pub fn from_matrix(matrix: &NumericMatrix, completed: Option<&Array2<f64>>) -> Self {
        let n = matrix.nrows();
        let columns = matrix
            .columns()
            .iter()
            .zip(matrix.missing_per_column())
            .map(|(name, missing)| ColumnMissing {
                column: name.clone(),
                missing,
                fraction: if n == 0 { 0.0 } else { missing as f64 / n as f64 },
            })
            .collect();

        let before = matrix
            .mask()
            .rows()
            .into_iter()
            .filter(|row| row.iter().any(|&m| m))
            .count();
        let after = completed.map_or(before, |values| {
            values
                .rows()
                .into_iter()
                .filter(|row| row.iter().any(|v| v.is_nan()))
                .count()
        });

        Self {
            rows: n,
            columns,
            flagged_records_before: before,
            flagged_records_after: after,
        }
    }

    pub fn total_missing(&self) -> usize {
        self.columns.iter().map(|c| c.missing).sum()
    }
}
