//! Numeric matrix extraction

use crate::data::{ColumnRole, ColumnSpec, Table};
use crate::error::{PhenoQcError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Eligible numeric columns plus the original-missingness mask.
///
/// Missing cells hold `NaN` in `values`; `mask[[i, j]]` is `true` iff the
/// cell was missing before any imputation. The mask is never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericMatrix {
    columns: Vec<String>,
    values: Array2<f64>,
    mask: Array2<bool>,
}

impl NumericMatrix {
    /// Build from values with `NaN` marking missing cells
    pub fn from_values(columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if columns.len() != values.ncols() {
            return Err(PhenoQcError::ShapeError {
                expected: format!("{} columns", columns.len()),
                actual: format!("{} columns", values.ncols()),
            });
        }
        let mask = values.mapv(|v| v.is_nan());
        Ok(Self { columns, values, mask })
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    /// Originally observed cells in row-major order
    pub fn observed_cells(&self) -> Vec<(usize, usize)> {
        self.mask
            .indexed_iter()
            .filter(|(_, &missing)| !missing)
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn missing_count(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    /// Missing cells per column
    pub fn missing_per_column(&self) -> Vec<usize> {
        self.mask
            .columns()
            .into_iter()
            .map(|col| col.iter().filter(|&&m| m).count())
            .collect()
    }
}

/// Selects imputation-eligible columns from a [`Table`].
#[derive(Debug, Clone, Default)]
pub struct MatrixBuilder {
    label_column: Option<String>,
    protected: HashSet<String>,
}

impl MatrixBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude the label column even when it is numeric
    pub fn with_label_column(mut self, label: Option<&str>) -> Self {
        self.label_column = label.map(str::to_string);
        self
    }

    /// Exclude protected columns even when they are numeric
    pub fn with_protected<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protected.extend(columns.into_iter().map(Into::into));
        self
    }

    fn is_eligible(&self, spec: &ColumnSpec) -> bool {
        spec.numeric
            && spec.role == ColumnRole::Feature
            && self.label_column.as_deref() != Some(spec.name.as_str())
            && !self.protected.contains(&spec.name)
    }

    /// Names of eligible columns, in table order
    pub fn eligible_columns(&self, specs: &[ColumnSpec]) -> Vec<String> {
        specs
            .iter()
            .filter(|s| self.is_eligible(s))
            .map(|s| s.name.clone())
            .collect()
    }

    /// Extract the eligible numeric matrix
    pub fn build(&self, table: &Table, specs: &[ColumnSpec]) -> Result<NumericMatrix> {
        let columns = self.eligible_columns(specs);
        if columns.is_empty() {
            return Err(PhenoQcError::DataError(
                "no eligible numeric feature columns".to_string(),
            ));
        }

        let n_rows = table.n_rows();
        if n_rows == 0 {
            return Err(PhenoQcError::DataError("dataset has zero rows".to_string()));
        }

        let mut values = Array2::from_elem((n_rows, columns.len()), f64::NAN);
        for (j, name) in columns.iter().enumerate() {
            let cells = table
                .column(name)
                .ok_or_else(|| PhenoQcError::ColumnNotFound(name.clone()))?;
            for (i, cell) in cells.iter().enumerate() {
                if let Some(v) = cell.as_f64() {
                    values[[i, j]] = v;
                }
            }
        }

        NumericMatrix::from_values(columns, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Cell, RoleAssignment};

    fn table() -> Table {
        Table::new()
            .with_column("id", vec![1.0.into(), 2.0.into(), 3.0.into()])
            .unwrap()
            .with_column("x", vec![1.0.into(), Cell::Null, 3.0.into()])
            .unwrap()
            .with_column("y", vec![Cell::Number(f64::NAN), 5.0.into(), 6.0.into()])
            .unwrap()
            .with_column("outcome", vec![0.0.into(), 1.0.into(), 0.0.into()])
            .unwrap()
            .with_column("batch", vec![7.0.into(), 7.0.into(), 8.0.into()])
            .unwrap()
            .with_column("note", vec!["a".into(), "b".into(), Cell::Null])
            .unwrap()
    }

    #[test]
    fn test_excludes_label_and_protected() {
        let table = table();
        let roles = RoleAssignment {
            identifiers: vec!["id".to_string()],
            ..Default::default()
        };
        // roles do not mark label/protected; the builder still excludes them
        let specs = roles.infer_specs(&table);
        let matrix = MatrixBuilder::new()
            .with_label_column(Some("outcome"))
            .with_protected(["batch"])
            .build(&table, &specs)
            .unwrap();

        assert_eq!(matrix.columns(), &["x".to_string(), "y".to_string()]);
        assert_eq!(matrix.nrows(), 3);
    }

    #[test]
    fn test_mask_tracks_missing() {
        let table = table();
        let specs = RoleAssignment::default().infer_specs(&table);
        let matrix = MatrixBuilder::new().build(&table, &specs).unwrap();
        let x = matrix.column_index("x").unwrap();
        let y = matrix.column_index("y").unwrap();
        assert!(matrix.mask()[[1, x]]);
        assert!(matrix.mask()[[0, y]]);
        assert!(!matrix.mask()[[0, x]]);
        assert_eq!(matrix.missing_count(), 2);
        assert!(matrix.column_index("note").is_none());
    }

    #[test]
    fn test_zero_columns_is_data_error() {
        let table = Table::new()
            .with_column("note", vec!["a".into()])
            .unwrap();
        let specs = RoleAssignment::default().infer_specs(&table);
        let err = MatrixBuilder::new().build(&table, &specs).unwrap_err();
        assert!(matches!(err, PhenoQcError::DataError(_)));
    }

    #[test]
    fn test_zero_rows_is_data_error() {
        let table = Table::new().with_column("x", vec![]).unwrap();
        let specs = vec![ColumnSpec::new("x", ColumnRole::Feature, true)];
        let err = MatrixBuilder::new().build(&table, &specs).unwrap_err();
        assert!(matches!(err, PhenoQcError::DataError(_)));
    }
}
