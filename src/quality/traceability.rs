//! Identifier uniqueness and provenance checks

use crate::data::{Cell, Table};
use crate::error::{PhenoQcError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceIssue {
    /// Identifier combination shared with another row
    DuplicateIdentifier,
    /// At least one identifier cell is null
    MissingIdentifier,
    /// Source column is null
    MissingSource,
}

impl TraceIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceIssue::DuplicateIdentifier => "duplicate_identifier",
            TraceIssue::MissingIdentifier => "missing_identifier",
            TraceIssue::MissingSource => "missing_source",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceabilityIssue {
    pub row: usize,
    pub issue: TraceIssue,
}

/// Rows breaking record traceability.
///
/// Every row of a duplicated identifier combination is reported (nulls
/// compare equal), then rows with a null identifier, then rows with a
/// null `source_column` when that column exists.
pub fn check_traceability(
    table: &Table,
    identifiers: &[String],
    source_column: Option<&str>,
) -> Result<Vec<TraceabilityIssue>> {
    if identifiers.is_empty() {
        return Err(PhenoQcError::InvalidParameter {
            name: "identifier_columns".to_string(),
            value: "[]".to_string(),
            reason: "at least one identifier column is required".to_string(),
        });
    }
    let id_cells: Vec<&[Cell]> = identifiers
        .iter()
        .map(|name| {
            table
                .column(name)
                .ok_or_else(|| PhenoQcError::ColumnNotFound(name.clone()))
        })
        .collect::<Result<_>>()?;

    let n = table.n_rows();
    let keys: Vec<Vec<Option<String>>> = (0..n)
        .map(|i| id_cells.iter().map(|cells| cells[i].render()).collect())
        .collect();
    let mut counts: HashMap<&[Option<String>], usize> = HashMap::with_capacity(n);
    for key in &keys {
        *counts.entry(key.as_slice()).or_insert(0) += 1;
    }

    let mut issues: Vec<TraceabilityIssue> = keys
        .iter()
        .enumerate()
        .filter(|(_, key)| counts[key.as_slice()] > 1)
        .map(|(row, _)| TraceabilityIssue {
            row,
            issue: TraceIssue::DuplicateIdentifier,
        })
        .collect();

    issues.extend(
        keys.iter()
            .enumerate()
            .filter(|(_, key)| key.iter().any(Option::is_none))
            .map(|(row, _)| TraceabilityIssue {
                row,
                issue: TraceIssue::MissingIdentifier,
            }),
    );

    if let Some(cells) = source_column.and_then(|name| table.column(name)) {
        issues.extend(
            cells
                .iter()
                .enumerate()
                .filter(|(_, c)| c.is_null())
                .map(|(row, _)| TraceabilityIssue {
                    row,
                    issue: TraceIssue::MissingSource,
                }),
        );
    }
    Ok(issues)
}
