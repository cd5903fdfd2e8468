//! Range checks of table values against configured bounds

use crate::config::RangeRule;
use crate::data::{Cell, Table};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A value outside its column's allowed range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeViolation {
    pub row: usize,
    pub column: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

/// Flags numeric values below `minimum` or above `maximum`.
///
/// Text cells are parsed as numbers; unparseable text and nulls are not
/// range violations.
#[derive(Debug, Clone, Default)]
pub struct AccuracyChecker {
    ranges: BTreeMap<String, RangeRule>,
}

impl AccuracyChecker {
    pub fn new(ranges: BTreeMap<String, RangeRule>) -> Self {
        Self { ranges }
    }

    /// Ruled columns absent from the table
    pub fn missing_columns(&self, table: &Table) -> Vec<String> {
        self.ranges
            .keys()
            .filter(|c| table.column(c).is_none())
            .cloned()
            .collect()
    }

    /// Violations ordered by column name, then row
    pub fn check(&self, table: &Table) -> Vec<RangeViolation> {
        let mut violations = Vec::new();
        for (column, rule) in &self.ranges {
            if rule.minimum.is_none() && rule.maximum.is_none() {
                continue;
            }
            let Some(cells) = table.column(column) else {
                continue;
            };
            for (row, cell) in cells.iter().enumerate() {
                let Some(value) = numeric_value(cell) else {
                    continue;
                };
                let below = rule.minimum.map_or(false, |min| value < min);
                let above = rule.maximum.map_or(false, |max| value > max);
                if below || above {
                    violations.push(RangeViolation {
                        row,
                        column: column.clone(),
                        value,
                        minimum: rule.minimum,
                        maximum: rule.maximum,
                    });
                }
            }
        }
        violations
    }
}

fn numeric_value(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(v) if v.is_finite() => Some(*v),
        Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(minimum: Option<f64>, maximum: Option<f64>) -> RangeRule {
        RangeRule { minimum, maximum }
    }

    #[test]
    fn test_out_of_range_rows() {
        let table = Table::new()
            .with_column("Age", vec![Cell::from(34.0), Cell::from(-2.0), Cell::Null, Cell::from(140.0)])
            .unwrap()
            .with_column("Code", vec![Cell::from("12"), Cell::from("n/a"), Cell::from("9"), Cell::from("3")])
            .unwrap();
        let mut ranges = BTreeMap::new();
        ranges.insert("Age".to_string(), rule(Some(0.0), Some(120.0)));
        ranges.insert("Code".to_string(), rule(None, Some(10.0)));

        let violations = AccuracyChecker::new(ranges).check(&table);
        let found: Vec<(&str, usize)> = violations.iter().map(|v| (v.column.as_str(), v.row)).collect();
        assert_eq!(found, vec![("Age", 1), ("Age", 3), ("Code", 0)]);
        assert_eq!(violations[2].value, 12.0);
        assert_eq!(violations[2].minimum, None);
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let table = Table::new()
            .with_column("x", vec![Cell::from(0.0), Cell::from(1.0)])
            .unwrap();
        let mut ranges = BTreeMap::new();
        ranges.insert("x".to_string(), rule(Some(0.0), Some(1.0)));
        assert!(AccuracyChecker::new(ranges).check(&table).is_empty());
    }

    #[test]
    fn test_missing_column_reported() {
        let table = Table::new().with_column("x", vec![Cell::from(1.0)]).unwrap();
        let mut ranges = BTreeMap::new();
        ranges.insert("Weight".to_string(), rule(Some(0.0), None));
        let checker = AccuracyChecker::new(ranges);
        assert_eq!(checker.missing_columns(&table), vec!["Weight".to_string()]);
        assert!(checker.check(&table).is_empty());
    }
}
