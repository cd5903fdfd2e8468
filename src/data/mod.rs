//! Tabular data model
//!
//! Provides the in-memory shapes the engine consumes:
//! - [`Table`] - ordered named columns of [`Cell`] values
//! - [`ColumnSpec`] / [`ColumnRole`] - role and numeric-ness per column
//! - [`NumericMatrix`] - the eligible numeric subset plus its missingness mask

mod matrix;

pub use matrix::{MatrixBuilder, NumericMatrix};

use crate::error::{PhenoQcError, Result};
use serde::{Deserialize, Serialize};

/// A single table cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Number(f64),
    Text(String),
    Null,
}

impl Cell {
    /// Null-equivalent check (explicit null or NaN)
    #[inline]
    pub fn is_null(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Number(v) => v.is_nan(),
            Cell::Text(_) => false,
        }
    }

    /// Numeric value, if any
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) if !v.is_nan() => Some(*v),
            _ => None,
        }
    }

    /// Text rendering used for label counting
    pub fn render(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Number(v) if v.is_nan() => None,
            Cell::Number(v) => Some(if v.fract() == 0.0 && v.abs() < 1e15 {
                format!("{}", *v as i64)
            } else {
                v.to_string()
            }),
            Cell::Text(s) => Some(s.clone()),
        }
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Number(v)
    }
}

impl From<Option<f64>> for Cell {
    fn from(v: Option<f64>) -> Self {
        v.map(Cell::Number).unwrap_or(Cell::Null)
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

/// Column-major table with named columns
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Vec<Cell>>,
}

impl Table {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column; every column must have the same length
    pub fn with_column(mut self, name: impl Into<String>, cells: Vec<Cell>) -> Result<Self> {
        self.push_column(name, cells)?;
        Ok(self)
    }

    /// Append a column in place
    pub fn push_column(&mut self, name: impl Into<String>, cells: Vec<Cell>) -> Result<()> {
        let name = name.into();
        if self.names.contains(&name) {
            return Err(PhenoQcError::DataError(format!("duplicate column '{}'", name)));
        }
        if let Some(first) = self.columns.first() {
            if first.len() != cells.len() {
                return Err(PhenoQcError::ShapeError {
                    expected: format!("{} rows", first.len()),
                    actual: format!("{} rows in column '{}'", cells.len(), name),
                });
            }
        }
        self.names.push(name);
        self.columns.push(cells);
        Ok(())
    }

    /// Build a table of numeric columns from row-major optional values
    pub fn from_numeric_rows(names: &[&str], rows: &[Vec<Option<f64>>]) -> Result<Self> {
        let mut table = Table::new();
        for (j, name) in names.iter().enumerate() {
            let mut cells = Vec::with_capacity(rows.len());
            for (i, row) in rows.iter().enumerate() {
                let value = row.get(j).copied().ok_or_else(|| PhenoQcError::ShapeError {
                    expected: format!("{} values per row", names.len()),
                    actual: format!("{} values in row {}", row.len(), i),
                })?;
                cells.push(Cell::from(value));
            }
            table.push_column(*name, cells)?;
        }
        Ok(table)
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Cells of a named column
    pub fn column(&self, name: &str) -> Option<&[Cell]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.columns[idx].as_slice())
    }

    /// Iterate over `(name, cells)` in column order
    pub fn iter_columns(&self) -> impl Iterator<Item = (&str, &[Cell])> {
        self.names
            .iter()
            .zip(self.columns.iter())
            .map(|(n, c)| (n.as_str(), c.as_slice()))
    }
}

/// Role of a column, assigned by the schema/config collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Feature,
    Identifier,
    Label,
    Protected,
}

/// Column description consumed by the matrix builder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub role: ColumnRole,
    pub numeric: bool,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, role: ColumnRole, numeric: bool) -> Self {
        Self {
            name: name.into(),
            role,
            numeric,
        }
    }
}

/// Role assignments supplied by the schema/config provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub identifiers: Vec<String>,
    pub label: Option<String>,
    pub protected: Vec<String>,
}

impl RoleAssignment {
    /// Role of a column; label wins over identifier wins over protected
    pub fn role_of(&self, name: &str) -> ColumnRole {
        if self.label.as_deref() == Some(name) {
            ColumnRole::Label
        } else if self.identifiers.iter().any(|c| c == name) {
            ColumnRole::Identifier
        } else if self.protected.iter().any(|c| c == name) {
            ColumnRole::Protected
        } else {
            ColumnRole::Feature
        }
    }

    /// Infer column specs: a column is numeric iff it has no text cells
    /// and at least one number.
    pub fn infer_specs(&self, table: &Table) -> Vec<ColumnSpec> {
        table
            .iter_columns()
            .map(|(name, cells)| {
                let has_text = cells.iter().any(|c| matches!(c, Cell::Text(_)));
                let has_number = cells.iter().any(|c| matches!(c, Cell::Number(_)));
                ColumnSpec::new(name, self.role_of(name), has_number && !has_text)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_null_equivalents() {
        assert!(Cell::Null.is_null());
        assert!(Cell::Number(f64::NAN).is_null());
        assert!(!Cell::Number(0.0).is_null());
        assert!(!Cell::Text(String::new()).is_null());
        assert_eq!(Cell::Number(2.0).render().as_deref(), Some("2"));
        assert_eq!(Cell::Number(2.5).render().as_deref(), Some("2.5"));
    }

    #[test]
    fn test_table_shape_checks() {
        let table = Table::new()
            .with_column("a", vec![1.0.into(), 2.0.into()])
            .unwrap();
        let err = table.clone().with_column("b", vec![1.0.into()]).unwrap_err();
        assert!(matches!(err, PhenoQcError::ShapeError { .. }));
        let err = table.with_column("a", vec![1.0.into(), 2.0.into()]).unwrap_err();
        assert!(matches!(err, PhenoQcError::DataError(_)));
    }

    #[test]
    fn test_infer_specs_roles() {
        let table = Table::new()
            .with_column("id", vec!["p1".into(), "p2".into()])
            .unwrap()
            .with_column("age", vec![30.0.into(), Cell::Null])
            .unwrap()
            .with_column("class", vec![1.0.into(), 0.0.into()])
            .unwrap()
            .with_column("site", vec![3.0.into(), 4.0.into()])
            .unwrap();

        let roles = RoleAssignment {
            identifiers: vec!["id".to_string()],
            label: Some("class".to_string()),
            protected: vec!["site".to_string()],
        };
        let specs = roles.infer_specs(&table);
        assert_eq!(specs[0], ColumnSpec::new("id", ColumnRole::Identifier, false));
        assert_eq!(specs[1], ColumnSpec::new("age", ColumnRole::Feature, true));
        assert_eq!(specs[2].role, ColumnRole::Label);
        assert_eq!(specs[3].role, ColumnRole::Protected);
    }
}
