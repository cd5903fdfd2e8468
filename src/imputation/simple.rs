//! Central-tendency imputation (mean / median / mode)

use crate::error::Result;
use crate::imputation::{observed_values, Completion, ImputationWarning, Imputer};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Per-column statistic used for filling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimpleStatistic {
    Mean,
    Median,
    /// Most frequent value; ties go to the first value seen in row order
    Mode,
}

/// Fills every missing cell of a column with one statistic computed over
/// that column's observed cells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleImputer {
    statistic: SimpleStatistic,
}

impl SimpleImputer {
    pub fn new(statistic: SimpleStatistic) -> Self {
        Self { statistic }
    }

    /// Statistic of a column's observed values, `None` if there are none
    pub fn statistic(&self, observed: &[f64]) -> Option<f64> {
        if observed.is_empty() {
            return None;
        }
        Some(match self.statistic {
            SimpleStatistic::Mean => observed.iter().sum::<f64>() / observed.len() as f64,
            SimpleStatistic::Median => median(observed),
            SimpleStatistic::Mode => mode(observed),
        })
    }
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn mode(values: &[f64]) -> f64 {
    // counts keyed by bit pattern, values kept in first-seen order
    let mut counts: HashMap<u64, usize> = HashMap::with_capacity(values.len());
    let mut order: Vec<f64> = Vec::new();
    for &v in values {
        let v = if v == 0.0 { 0.0 } else { v };
        let count = counts.entry(v.to_bits()).or_insert(0);
        if *count == 0 {
            order.push(v);
        }
        *count += 1;
    }
    let mut best = order[0];
    let mut best_count = counts[&best.to_bits()];
    for &v in order.iter().skip(1) {
        // strictly greater keeps the earliest value on ties
        let count = counts[&v.to_bits()];
        if count > best_count {
            best = v;
            best_count = count;
        }
    }
    best
}

impl Imputer for SimpleImputer {
    fn complete(&self, x: &Array2<f64>, mask: &Array2<bool>) -> Result<Completion> {
        let mut values = x.clone();
        let mut warnings = Vec::new();

        for j in 0..x.ncols() {
            if !mask.column(j).iter().any(|&m| m) {
                continue;
            }
            match self.statistic(&observed_values(x, mask, j)) {
                Some(fill) => {
                    for i in 0..x.nrows() {
                        if mask[[i, j]] {
                            values[[i, j]] = fill;
                        }
                    }
                }
                None => {
                    for i in 0..x.nrows() {
                        values[[i, j]] = f64::NAN;
                    }
                    warnings.push(ImputationWarning::column(
                        j,
                        "column has no observed values; left unimputed",
                    ));
                }
            }
        }

        Ok(Completion { values, warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_mask(values: Vec<f64>, rows: usize, cols: usize) -> (Array2<f64>, Array2<bool>) {
        let x = Array2::from_shape_vec((rows, cols), values).unwrap();
        let mask = x.mapv(|v| v.is_nan());
        (x, mask)
    }

    #[test]
    fn test_mean_fill() {
        let (x, mask) = with_mask(vec![1.0, 2.0, f64::NAN, 4.0, 3.0, f64::NAN, 5.0, 6.0], 4, 2);
        let out = SimpleImputer::new(SimpleStatistic::Mean).complete(&x, &mask).unwrap();
        assert_eq!(out.values[[1, 0]], 3.0);
        assert_eq!(out.values[[2, 1]], 4.0);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_median_even_count() {
        let (x, mask) = with_mask(vec![1.0, 2.0, 10.0, 20.0, f64::NAN], 5, 1);
        let out = SimpleImputer::new(SimpleStatistic::Median).complete(&x, &mask).unwrap();
        assert_eq!(out.values[[4, 0]], 6.0);
    }

    #[test]
    fn test_mode_tie_first_encountered() {
        // column [A, B, A, B, _, _] with A = 7, B = 3
        let (x, mask) = with_mask(vec![7.0, 3.0, 7.0, 3.0, f64::NAN, f64::NAN], 6, 1);
        let out = SimpleImputer::new(SimpleStatistic::Mode).complete(&x, &mask).unwrap();
        assert_eq!(out.values[[4, 0]], 7.0);
        assert_eq!(out.values[[5, 0]], 7.0);

        let (x, mask) = with_mask(vec![3.0, 7.0, 3.0, 7.0, f64::NAN], 5, 1);
        let out = SimpleImputer::new(SimpleStatistic::Mode).complete(&x, &mask).unwrap();
        assert_eq!(out.values[[4, 0]], 3.0);
    }

    #[test]
    fn test_mode_signed_zero_and_many_distinct() {
        let mut values: Vec<f64> = (0..500).map(|i| i as f64).collect();
        values.extend_from_slice(&[-0.0, 250.0, 0.0, f64::NAN]);
        let (x, mask) = with_mask(values, 504, 1);
        let out = SimpleImputer::new(SimpleStatistic::Mode).complete(&x, &mask).unwrap();
        // 0 and -0 share a bucket (3 hits) and beat 250 (2 hits)
        assert_eq!(out.values[[503, 0]], 0.0);
    }

    #[test]
    fn test_mode_majority() {
        let (x, mask) = with_mask(vec![1.0, 2.0, 2.0, f64::NAN], 4, 1);
        let out = SimpleImputer::new(SimpleStatistic::Mode).complete(&x, &mask).unwrap();
        assert_eq!(out.values[[3, 0]], 2.0);
    }

    #[test]
    fn test_masked_truth_is_ignored() {
        let x = Array2::from_shape_vec((3, 1), vec![1.0, 100.0, 3.0]).unwrap();
        let mut mask = Array2::from_elem((3, 1), false);
        mask[[1, 0]] = true;
        let out = SimpleImputer::new(SimpleStatistic::Mean).complete(&x, &mask).unwrap();
        assert_eq!(out.values[[1, 0]], 2.0);
    }

    #[test]
    fn test_all_missing_column_warns() {
        let (x, mask) = with_mask(vec![f64::NAN, f64::NAN], 2, 1);
        let out = SimpleImputer::new(SimpleStatistic::Mean).complete(&x, &mask).unwrap();
        assert_eq!(out.warnings.len(), 1);
        assert!(out.values[[0, 0]].is_nan());
    }
}
