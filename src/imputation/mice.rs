//! MICE (Multiple Imputation by Chained Equations) imputer

use crate::error::Result;
use crate::imputation::linalg::solve;
use crate::imputation::{mean_initialized, Completion, ImputationWarning, Imputer};
use ndarray::{Array1, Array2};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Chained linear-regression imputer.
///
/// Missing cells start at the column mean; each pass then re-predicts every
/// incomplete column from all other columns using the current values. The
/// number of passes is fixed, convergence is not checked.
///
/// With a bootstrap seed every regression is fitted on a seeded resample of
/// the observed rows, so differently seeded runs give different draws for
/// multiple-imputation spread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiceImputer {
    max_iter: usize,
    /// Relative ridge penalty keeping the normal equations well-posed
    ridge: f64,
    bootstrap_seed: Option<u64>,
}

impl MiceImputer {
    pub fn new() -> Self {
        Self {
            max_iter: 10,
            ridge: 1e-6,
            bootstrap_seed: None,
        }
    }

    pub fn with_bootstrap_seed(mut self, seed: u64) -> Self {
        self.bootstrap_seed = Some(seed);
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter.max(1);
        self
    }

    pub fn with_ridge(mut self, ridge: f64) -> Self {
        self.ridge = ridge.max(0.0);
        self
    }

    /// Fit `y ~ intercept + X beta` on centered data; returns (beta, intercept)
    fn fit_linear(&self, x: &Array2<f64>, y: &Array1<f64>) -> (Array1<f64>, f64) {
        let n = x.nrows();
        let p = x.ncols();
        let y_mean = y.mean().unwrap_or(0.0);
        if n < 2 || p == 0 {
            return (Array1::zeros(p), y_mean);
        }

        let x_means: Array1<f64> = (0..p).map(|j| x.column(j).sum() / n as f64).collect();
        let xc = x - &x_means;
        let yc = y - y_mean;

        let mut gram = xc.t().dot(&xc);
        let trace = (0..p).map(|k| gram[[k, k]]).sum::<f64>() / p as f64;
        let penalty = self.ridge * trace.max(1e-12);
        for k in 0..p {
            gram[[k, k]] += penalty;
        }
        let rhs = xc.t().dot(&yc);

        match solve(&gram, &rhs) {
            Some(beta) => {
                let intercept = y_mean - beta.dot(&x_means);
                (beta, intercept)
            }
            None => (Array1::zeros(p), y_mean),
        }
    }

    /// One chained pass over the incomplete columns
    fn pass(
        &self,
        data: &mut Array2<f64>,
        mask: &Array2<bool>,
        active: &[usize],
        targets: &[usize],
        rng: &mut Option<ChaCha8Rng>,
    ) {
        for &target in targets {
            let predictors: Vec<usize> = active.iter().copied().filter(|&c| c != target).collect();
            let mut observed: Vec<usize> = (0..data.nrows()).filter(|&r| !mask[[r, target]]).collect();
            if let Some(rng) = rng.as_mut() {
                let n = observed.len();
                observed = (0..n).map(|_| observed[rng.gen_range(0..n)]).collect();
            }
            let missing: Vec<usize> = (0..data.nrows()).filter(|&r| mask[[r, target]]).collect();

            let mut x_train = Array2::zeros((observed.len(), predictors.len()));
            let mut y_train = Array1::zeros(observed.len());
            for (i, &r) in observed.iter().enumerate() {
                for (k, &c) in predictors.iter().enumerate() {
                    x_train[[i, k]] = data[[r, c]];
                }
                y_train[i] = data[[r, target]];
            }

            let (beta, intercept) = self.fit_linear(&x_train, &y_train);

            for &r in &missing {
                let pred = predictors
                    .iter()
                    .enumerate()
                    .map(|(k, &c)| beta[k] * data[[r, c]])
                    .sum::<f64>()
                    + intercept;
                data[[r, target]] = pred;
            }
        }
    }
}

impl Default for MiceImputer {
    fn default() -> Self {
        Self::new()
    }
}

impl Imputer for MiceImputer {
    fn complete(&self, x: &Array2<f64>, mask: &Array2<bool>) -> Result<Completion> {
        let (mut data, empty) = mean_initialized(x, mask);

        let active: Vec<usize> = (0..x.ncols()).filter(|j| !empty.contains(j)).collect();
        let targets: Vec<usize> = active
            .iter()
            .copied()
            .filter(|&j| mask.column(j).iter().any(|&m| m))
            .collect();

        let mut rng = self.bootstrap_seed.map(ChaCha8Rng::seed_from_u64);
        if !targets.is_empty() {
            for _ in 0..self.max_iter {
                self.pass(&mut data, mask, &active, &targets, &mut rng);
            }
        }

        let warnings = empty
            .into_iter()
            .map(|j| ImputationWarning::column(j, "column has no observed values; left unimputed"))
            .collect();

        Ok(Completion { values: data, warnings })
    }
}
