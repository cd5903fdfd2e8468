//! KNN-based imputation

use crate::config::KnnWeights;
use crate::error::Result;
use crate::imputation::{observed_mean, Completion, ImputationWarning, Imputer};
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Distance/row pair ordered by distance, then row index
#[derive(Debug, Clone, Copy)]
struct DistanceIdx(f64, usize);

impl PartialEq for DistanceIdx {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DistanceIdx {}

impl PartialOrd for DistanceIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DistanceIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max heap: the farthest (then highest-index) neighbor is popped first
        self.0
            .partial_cmp(&other.0)
            .unwrap_or(Ordering::Equal)
            .then(self.1.cmp(&other.1))
    }
}

/// KNN imputer over pairwise-complete (nan-euclidean) distances.
///
/// For each missing cell the donors are the other rows that observe the
/// target column. A cell with fewer than `n_neighbors` donors falls back to
/// the column mean and is reported as a warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnImputer {
    n_neighbors: usize,
    weights: KnnWeights,
}

impl KnnImputer {
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors: n_neighbors.max(1),
            weights: KnnWeights::Uniform,
        }
    }

    pub fn with_weights(mut self, weights: KnnWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Nan-euclidean distance: squared differences over columns observed in
    /// both rows, rescaled by `total / present`. Infinite when no column is
    /// shared.
    fn distance(x: &Array2<f64>, mask: &Array2<bool>, a: usize, b: usize) -> f64 {
        let n_cols = x.ncols();
        let mut present = 0usize;
        let mut accum = 0.0f64;
        for c in 0..n_cols {
            if mask[[a, c]] || mask[[b, c]] {
                continue;
            }
            let (va, vb) = (x[[a, c]], x[[b, c]]);
            if va.is_nan() || vb.is_nan() {
                continue;
            }
            present += 1;
            accum += (va - vb) * (va - vb);
        }
        if present == 0 {
            return f64::INFINITY;
        }
        (accum * n_cols as f64 / present as f64).sqrt()
    }

    /// k nearest donors (distance ascending, row index on ties)
    fn nearest(&self, distances: &[(usize, f64)], donor_ok: impl Fn(usize) -> bool) -> Vec<DistanceIdx> {
        let k = self.n_neighbors;
        let mut heap: BinaryHeap<DistanceIdx> = BinaryHeap::with_capacity(k + 1);
        for &(row, dist) in distances {
            if !dist.is_finite() || !donor_ok(row) {
                continue;
            }
            let candidate = DistanceIdx(dist, row);
            if heap.len() < k {
                heap.push(candidate);
            } else if let Some(top) = heap.peek() {
                if candidate < *top {
                    heap.pop();
                    heap.push(candidate);
                }
            }
        }
        heap.into_sorted_vec()
    }

    fn weighted_value(&self, x: &Array2<f64>, neighbors: &[DistanceIdx], j: usize) -> f64 {
        match self.weights {
            KnnWeights::Uniform => {
                neighbors.iter().map(|n| x[[n.1, j]]).sum::<f64>() / neighbors.len() as f64
            }
            KnnWeights::Distance => {
                let exact: Vec<&DistanceIdx> = neighbors.iter().filter(|n| n.0 <= 1e-12).collect();
                if !exact.is_empty() {
                    return exact.iter().map(|n| x[[n.1, j]]).sum::<f64>() / exact.len() as f64;
                }
                let (weighted_sum, weight_sum) = neighbors.iter().fold((0.0, 0.0), |(ws, w), n| {
                    let weight = 1.0 / n.0;
                    (ws + weight * x[[n.1, j]], w + weight)
                });
                weighted_sum / weight_sum
            }
        }
    }
}

impl Default for KnnImputer {
    fn default() -> Self {
        Self::new(5)
    }
}

impl Imputer for KnnImputer {
    fn complete(&self, x: &Array2<f64>, mask: &Array2<bool>) -> Result<Completion> {
        let n_rows = x.nrows();
        let n_cols = x.ncols();
        let means: Vec<Option<f64>> = (0..n_cols).map(|j| observed_mean(x, mask, j)).collect();

        let rows_with_missing: Vec<usize> = (0..n_rows)
            .filter(|&i| mask.row(i).iter().any(|&m| m))
            .collect();

        // Each row is independent; par_iter keeps output in row order
        let filled: Vec<(usize, Vec<(usize, f64)>, Vec<ImputationWarning>)> = rows_with_missing
            .par_iter()
            .map(|&i| {
                let distances: Vec<(usize, f64)> = (0..n_rows)
                    .filter(|&r| r != i)
                    .map(|r| (r, Self::distance(x, mask, i, r)))
                    .collect();

                let mut cells = Vec::new();
                let mut warnings = Vec::new();
                for j in (0..n_cols).filter(|&j| mask[[i, j]]) {
                    let neighbors = self.nearest(&distances, |r| !mask[[r, j]]);
                    if neighbors.len() >= self.n_neighbors {
                        cells.push((j, self.weighted_value(x, &neighbors, j)));
                        continue;
                    }
                    match means[j] {
                        Some(mean) => {
                            cells.push((j, mean));
                            warnings.push(ImputationWarning::cell(
                                i,
                                j,
                                format!(
                                    "only {} of {} neighbors available; filled with column mean",
                                    neighbors.len(),
                                    self.n_neighbors
                                ),
                            ));
                        }
                        None => {
                            cells.push((j, f64::NAN));
                            warnings.push(ImputationWarning::cell(
                                i,
                                j,
                                "column has no observed values; left unimputed",
                            ));
                        }
                    }
                }
                (i, cells, warnings)
            })
            .collect();

        let mut values = x.clone();
        let mut warnings = Vec::new();
        for (i, cells, row_warnings) in filled {
            for (j, v) in cells {
                values[[i, j]] = v;
            }
            warnings.extend(row_warnings);
        }

        Ok(Completion { values, warnings })
    }
}
