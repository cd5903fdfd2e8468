//! Label balance report

use crate::data::Cell;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Count and share of one label value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassCount {
    pub label: String,
    pub count: usize,
    pub proportion: f64,
}

/// Class distribution of the label column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDistribution {
    /// Label column name
    pub column: String,
    /// Non-null labels counted
    pub total: usize,
    /// Classes in first-encountered order
    pub classes: Vec<ClassCount>,
    /// Smallest class (first encountered on ties)
    pub minority_class: Option<String>,
    pub minority_proportion: Option<f64>,
    pub warn_threshold: f64,
    /// Minority share is below the threshold
    pub warning: bool,
}

/// Build the report from the label column's cells
pub fn class_distribution(column: &str, cells: &[Cell], warn_threshold: f64) -> ClassDistribution {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for label in cells.iter().filter_map(Cell::render) {
        match counts.get_mut(&label) {
            Some(count) => *count += 1,
            None => {
                counts.insert(label.clone(), 1);
                order.push(label);
            }
        }
    }

    let total: usize = counts.values().sum();
    let classes: Vec<ClassCount> = order
        .into_iter()
        .map(|label| {
            let count = counts[&label];
            ClassCount {
                label,
                count,
                proportion: count as f64 / total as f64,
            }
        })
        .collect();

    let minority = classes.iter().fold(None::<&ClassCount>, |best, c| match best {
        Some(b) if b.count <= c.count => Some(b),
        _ => Some(c),
    });
    let minority_proportion = minority.map(|c| c.proportion);

    ClassDistribution {
        column: column.to_string(),
        total,
        minority_class: minority.map(|c| c.label.clone()),
        minority_proportion,
        warn_threshold,
        warning: minority_proportion.map_or(false, |p| p < warn_threshold),
        classes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imbalanced_labels_warn() {
        let mut cells: Vec<Cell> = (0..19).map(|_| Cell::from("healthy")).collect();
        cells.push(Cell::from("case"));
        cells.push(Cell::Null);
        let report = class_distribution("status", &cells, 0.10);
        assert_eq!(report.total, 20);
        assert_eq!(report.minority_class.as_deref(), Some("case"));
        assert_eq!(report.minority_proportion, Some(0.05));
        assert!(report.warning);
    }

    #[test]
    fn test_minority_tie_first_encountered() {
        let cells = vec![Cell::from("b"), Cell::from("a"), Cell::from("c"), Cell::from("c")];
        let report = class_distribution("y", &cells, 0.10);
        assert_eq!(report.minority_class.as_deref(), Some("b"));
        assert!(!report.warning);
    }

    #[test]
    fn test_many_classes_keep_first_seen_order() {
        let mut cells: Vec<Cell> = (0..300).map(|i| Cell::from(format!("c{}", i % 150).as_str())).collect();
        cells.push(Cell::from("c7"));
        let report = class_distribution("y", &cells, 0.10);
        assert_eq!(report.classes.len(), 150);
        assert_eq!(report.classes[0].label, "c0");
        assert_eq!(report.classes[149].label, "c149");
        assert_eq!(report.classes[7].count, 3);
        assert_eq!(report.total, 301);
        assert_eq!(report.minority_class.as_deref(), Some("c0"));
    }

    #[test]
    fn test_numeric_labels_rendered() {
        let cells = vec![Cell::Number(1.0), Cell::Number(0.0), Cell::Number(1.0)];
        let report = class_distribution("y", &cells, 0.10);
        assert_eq!(report.classes[0].label, "1");
        assert_eq!(report.classes[1].label, "0");
    }

    #[test]
    fn test_all_null() {
        let report = class_distribution("y", &[Cell::Null], 0.10);
        assert_eq!(report.total, 0);
        assert!(report.minority_class.is_none());
        assert!(!report.warning);
    }
}
