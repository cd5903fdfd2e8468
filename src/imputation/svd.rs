//! Iterative low-rank (SVD) completion

use crate::error::Result;
use crate::imputation::linalg::symmetric_eigen;
use crate::imputation::{mean_initialized, Completion, ImputationWarning, Imputer};
use ndarray::{s, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Low-rank matrix completion.
///
/// Missing cells start at the column mean. Each iteration projects the
/// current matrix onto its top-`rank` right singular vectors and copies
/// the projection back into the missing cells only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvdImputer {
    rank: Option<usize>,
    max_iters: usize,
}

impl SvdImputer {
    pub fn new() -> Self {
        Self {
            rank: None,
            max_iters: 100,
        }
    }

    pub fn with_rank(mut self, rank: usize) -> Self {
        self.rank = Some(rank.max(1));
        self
    }

    pub fn with_max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters.max(1);
        self
    }

    /// Rank actually used for an `n x p` matrix
    pub fn effective_rank(&self, n: usize, p: usize) -> usize {
        let limit = n.min(p);
        match self.rank {
            Some(rank) => rank.min(limit).max(1),
            None => limit.saturating_sub(1).max(1),
        }
    }

    /// Best rank-k approximation `X V_k V_k^T`
    fn low_rank(data: &Array2<f64>, k: usize) -> Array2<f64> {
        let gram = data.t().dot(data);
        let (_, vectors) = symmetric_eigen(&gram);
        let vk = vectors.slice(s![.., ..k]).to_owned();
        data.dot(&vk).dot(&vk.t())
    }
}

impl Default for SvdImputer {
    fn default() -> Self {
        Self::new()
    }
}

impl Imputer for SvdImputer {
    fn complete(&self, x: &Array2<f64>, mask: &Array2<bool>) -> Result<Completion> {
        let (filled, empty) = mean_initialized(x, mask);
        let mut warnings: Vec<ImputationWarning> = empty
            .iter()
            .map(|&j| ImputationWarning::column(j, "column has no observed values; left unimputed"))
            .collect();

        let active: Vec<usize> = (0..x.ncols()).filter(|j| !empty.contains(j)).collect();
        if active.is_empty() || !mask.iter().any(|&m| m) {
            return Ok(Completion { values: filled, warnings });
        }

        let mut data = filled.select(Axis(1), &active);
        let sub_mask = mask.select(Axis(1), &active);
        let k = self.effective_rank(data.nrows(), data.ncols());

        if k >= data.ncols() {
            for &j in &active {
                if mask.column(j).iter().any(|&m| m) {
                    warnings.push(ImputationWarning::column(
                        j,
                        format!("rank {} is not below the column count; cells keep the column mean", k),
                    ));
                }
            }
        } else {
            for _ in 0..self.max_iters {
                let approx = Self::low_rank(&data, k);
                ndarray::Zip::from(&mut data)
                    .and(&approx)
                    .and(&sub_mask)
                    .for_each(|d, &a, &m| {
                        if m {
                            *d = a;
                        }
                    });
            }
        }

        let mut values = filled;
        for (col, &j) in active.iter().enumerate() {
            values.column_mut(j).assign(&data.column(col));
        }
        Ok(Completion { values, warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_rank() {
        assert_eq!(SvdImputer::new().effective_rank(10, 4), 3);
        assert_eq!(SvdImputer::new().effective_rank(10, 1), 1);
        assert_eq!(SvdImputer::new().with_rank(9).effective_rank(10, 4), 4);
    }

    #[test]
    fn test_svd_recovers_rank_one() {
        // rows are multiples of (1, 2, 3)
        let mut values = Vec::new();
        for i in 1..=8 {
            let f = i as f64;
            values.extend_from_slice(&[f, 2.0 * f, 3.0 * f]);
        }
        let mut x = Array2::from_shape_vec((8, 3), values).unwrap();
        x[[3, 2]] = f64::NAN; // truth 12
        let mask = x.mapv(|v| v.is_nan());

        let out = SvdImputer::new()
            .with_rank(1)
            .with_max_iters(200)
            .complete(&x, &mask)
            .unwrap();
        assert!((out.values[[3, 2]] - 12.0).abs() < 0.05);
    }

    #[test]
    fn test_svd_fills_and_is_deterministic() {
        let x = Array2::from_shape_vec(
            (5, 3),
            vec![
                1.0, 2.0, 3.0,
                f64::NAN, 5.0, 6.0,
                7.0, f64::NAN, 9.0,
                10.0, 11.0, 12.0,
                13.0, 14.0, f64::NAN,
            ],
        )
        .unwrap();
        let mask = x.mapv(|v| v.is_nan());
        let a = SvdImputer::new().with_rank(2).with_max_iters(20).complete(&x, &mask).unwrap();
        let b = SvdImputer::new().with_rank(2).with_max_iters(20).complete(&x, &mask).unwrap();
        assert!(!a.values.iter().any(|v| v.is_nan()));
        assert_eq!(a.values, b.values);
    }

    #[test]
    fn test_full_rank_warns() {
        let x = Array2::from_shape_vec((3, 1), vec![1.0, f64::NAN, 3.0]).unwrap();
        let mask = x.mapv(|v| v.is_nan());
        let out = SvdImputer::new().complete(&x, &mask).unwrap();
        assert_eq!(out.values[[1, 0]], 2.0);
        assert_eq!(out.warnings.len(), 1);
    }
}
