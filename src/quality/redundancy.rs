//! Redundant column pairs: identical values or strong correlation

use crate::config::{CorrelationMethod, RedundancySection};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Kind of redundancy found for a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationType {
    Identical,
    Correlated,
}

/// A redundant pair of columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedundancyPair {
    /// Earlier column of the pair
    pub column_a: String,
    /// Later column of the pair
    pub column_b: String,
    #[serde(rename = "type")]
    pub relation: RelationType,
    /// 1.0 for identical pairs, the correlation coefficient otherwise
    pub score: f64,
    /// Correlation method, for correlated pairs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<CorrelationMethod>,
}

/// Pairwise column scan
#[derive(Debug, Clone)]
pub struct RedundancyDetector {
    threshold: f64,
    method: CorrelationMethod,
    epsilon: f64,
}

impl RedundancyDetector {
    pub fn new(threshold: f64, method: CorrelationMethod) -> Self {
        Self {
            threshold,
            method,
            epsilon: 1e-12,
        }
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon.max(0.0);
        self
    }

    pub fn from_section(section: &RedundancySection) -> Self {
        Self::new(section.threshold, section.method).with_epsilon(section.identical_epsilon)
    }

    /// Scan every unordered pair in column-index order. A pair that is
    /// identical is never also reported as correlated.
    pub fn detect(&self, x: &Array2<f64>, columns: &[String]) -> Vec<RedundancyPair> {
        let p = x.ncols().min(columns.len());
        let mut pairs = Vec::new();
        for a in 0..p {
            for b in (a + 1)..p {
                let (ca, cb) = (x.column(a), x.column(b));
                if self.identical(ca, cb) {
                    pairs.push(RedundancyPair {
                        column_a: columns[a].clone(),
                        column_b: columns[b].clone(),
                        relation: RelationType::Identical,
                        score: 1.0,
                        method: None,
                    });
                    continue;
                }
                if let Some(r) = correlation(ca, cb, self.method) {
                    if r.abs() >= self.threshold {
                        pairs.push(RedundancyPair {
                            column_a: columns[a].clone(),
                            column_b: columns[b].clone(),
                            relation: RelationType::Correlated,
                            score: r,
                            method: Some(self.method),
                        });
                    }
                }
            }
        }
        pairs
    }

    /// Same missingness and values within `epsilon` on every row, with at
    /// least one shared observed value
    fn identical(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> bool {
        let mut shared = 0usize;
        for (&va, &vb) in a.iter().zip(b.iter()) {
            match (va.is_nan(), vb.is_nan()) {
                (true, true) => continue,
                (false, false) => {
                    if (va - vb).abs() > self.epsilon {
                        return false;
                    }
                    shared += 1;
                }
                _ => return false,
            }
        }
        shared > 0
    }
}

/// Correlation over pairwise-complete rows; `None` with fewer than two
/// rows or a constant column
pub fn correlation(a: ArrayView1<f64>, b: ArrayView1<f64>, method: CorrelationMethod) -> Option<f64> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = a
        .iter()
        .zip(b.iter())
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(&x, &y)| (x, y))
        .unzip();
    if xs.len() < 2 {
        return None;
    }
    match method {
        CorrelationMethod::Pearson => pearson(&xs, &ys),
        CorrelationMethod::Spearman => pearson(&average_ranks(&xs), &average_ranks(&ys)),
    }
}

fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len() as f64;
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (a, b) in x.iter().zip(y.iter()) {
        let (dx, dy) = (a - mx, b - my);
        cov += dx * dy;
        vx += dx * dx;
        vy += dy * dy;
    }
    if vx <= 0.0 || vy <= 0.0 {
        return None;
    }
    Some((cov / (vx.sqrt() * vy.sqrt())).clamp(-1.0, 1.0))
}

/// 1-based ranks, ties get the average of their positions
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&i, &j| values[i].partial_cmp(&values[j]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && values[order[end + 1]] == values[order[start]] {
            end += 1;
        }
        let rank = (start + end) as f64 / 2.0 + 1.0;
        for &idx in &order[start..=end] {
            ranks[idx] = rank;
        }
        start = end + 1;
    }
    ranks
}
