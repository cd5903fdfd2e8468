//! Imputation strategy executors
//!
//! Provides the completion algorithms behind the imputation plan:
//! - Central tendency (mean / median / mode)
//! - KNN with pairwise-complete distances
//! - MICE (fixed-pass chained linear regression)
//! - Iterative low-rank SVD completion
//!
//! Every executor is deterministic: identical matrix, mask and parameters
//! always give identical output.

mod knn;
mod linalg;
mod mice;
mod simple;
mod svd;

pub use knn::KnnImputer;
pub use mice::MiceImputer;
pub use simple::{SimpleImputer, SimpleStatistic};
pub use svd::SvdImputer;

use crate::config::{ImputationPlan, StrategyConfig};
use crate::error::{PhenoQcError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// A recovered, per-cell or per-column problem during completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImputationWarning {
    /// Column index in the matrix being completed
    pub column: usize,
    /// Row index when the warning concerns a single cell
    pub row: Option<usize>,
    pub message: String,
}

impl ImputationWarning {
    pub fn column(column: usize, message: impl Into<String>) -> Self {
        Self {
            column,
            row: None,
            message: message.into(),
        }
    }

    pub fn cell(row: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            column,
            row: Some(row),
            message: message.into(),
        }
    }
}

/// Output of an executor
#[derive(Debug, Clone)]
pub struct Completion {
    pub values: Array2<f64>,
    pub warnings: Vec<ImputationWarning>,
}

/// Trait for imputation executors.
///
/// `mask[[i, j]] == true` marks a cell to be filled. Values under the mask
/// are never read, so callers may leave the ground truth in place.
pub trait Imputer: Send + Sync {
    fn complete(&self, x: &Array2<f64>, mask: &Array2<bool>) -> Result<Completion>;
}

/// Build the executor for a resolved strategy
pub fn executor_for(strategy: &StrategyConfig) -> Box<dyn Imputer> {
    match strategy {
        StrategyConfig::Mean => Box::new(SimpleImputer::new(SimpleStatistic::Mean)),
        StrategyConfig::Median => Box::new(SimpleImputer::new(SimpleStatistic::Median)),
        StrategyConfig::Mode => Box::new(SimpleImputer::new(SimpleStatistic::Mode)),
        StrategyConfig::Knn(p) => Box::new(KnnImputer::new(p.n_neighbors).with_weights(p.weights)),
        StrategyConfig::Mice(p) => Box::new(MiceImputer::new().with_max_iter(p.max_iter)),
        StrategyConfig::Svd(p) => {
            let imputer = SvdImputer::new().with_max_iters(p.max_iters);
            Box::new(match p.rank {
                Some(rank) => imputer.with_rank(rank),
                None => imputer,
            })
        }
    }
}

/// Complete a matrix according to a plan.
///
/// Columns are grouped by resolved strategy. Each group's executor runs on
/// the full matrix (all columns serve as predictors) and only that group's
/// columns are written back, so group order never affects the result.
pub fn apply_plan(x: &Array2<f64>, mask: &Array2<bool>, plan: &ImputationPlan) -> Result<Completion> {
    if x.dim() != mask.dim() {
        return Err(PhenoQcError::ShapeError {
            expected: format!("{:?}", x.dim()),
            actual: format!("{:?}", mask.dim()),
        });
    }
    if plan.columns().len() != x.ncols() {
        return Err(PhenoQcError::ShapeError {
            expected: format!("{} planned columns", plan.columns().len()),
            actual: format!("{} matrix columns", x.ncols()),
        });
    }

    let mut values = x.clone();
    let mut warnings = Vec::new();

    for (strategy, columns) in plan.groups() {
        let needs_fill = columns
            .iter()
            .any(|&j| mask.column(j).iter().any(|&m| m));
        if !needs_fill {
            continue;
        }

        let completion = executor_for(&strategy).complete(x, mask)?;
        for &j in &columns {
            values.column_mut(j).assign(&completion.values.column(j));
        }
        warnings.extend(
            completion
                .warnings
                .into_iter()
                .filter(|w| columns.contains(&w.column)),
        );
    }

    Ok(Completion { values, warnings })
}

/// Observed (unmasked) values of column `j`
pub(crate) fn observed_values(x: &Array2<f64>, mask: &Array2<bool>, j: usize) -> Vec<f64> {
    x.column(j)
        .iter()
        .zip(mask.column(j).iter())
        .filter(|(v, &m)| !m && !v.is_nan())
        .map(|(&v, _)| v)
        .collect()
}

/// Mean of observed values, `None` when the column has none
pub(crate) fn observed_mean(x: &Array2<f64>, mask: &Array2<bool>, j: usize) -> Option<f64> {
    let observed = observed_values(x, mask, j);
    if observed.is_empty() {
        None
    } else {
        Some(observed.iter().sum::<f64>() / observed.len() as f64)
    }
}

/// Copy of `x` with masked cells set to the column mean.
///
/// Columns without observed values keep `NaN` and are reported in the
/// returned list of indices.
pub(crate) fn mean_initialized(x: &Array2<f64>, mask: &Array2<bool>) -> (Array2<f64>, Vec<usize>) {
    let mut filled = x.clone();
    let mut empty = Vec::new();
    for j in 0..x.ncols() {
        match observed_mean(x, mask, j) {
            Some(mean) => {
                for i in 0..x.nrows() {
                    if mask[[i, j]] {
                        filled[[i, j]] = mean;
                    }
                }
            }
            None => {
                for i in 0..x.nrows() {
                    filled[[i, j]] = f64::NAN;
                }
                empty.push(j);
            }
        }
    }
    (filled, empty)
}
