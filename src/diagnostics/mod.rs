//! Imputation diagnostics
//!
//! - Repeated mask-and-score runs giving per-column bias (`mean_error`) and
//!   stability (`sd_error`) of the resolved plan
//! - Distribution shift between observed and imputed values ([`shift`])
//! - Spread of repeated MICE draws per imputed cell ([`uncertainty`])

pub mod shift;
pub mod uncertainty;

pub use shift::{ShiftAnalyzer, ShiftRow};
pub use uncertainty::{MiUncertaintyRunner, UncertaintyResult, UncertaintyRow};

use crate::config::{ImputationPlan, QcConfig, Scoring};
use crate::error::{PhenoQcError, Result};
use crate::imputation::apply_plan;
use crate::tuning::{hide_cells, score_cells, MaskSampler};
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Seed of repeat `k`; independent of execution order
pub fn repeat_seed(random_state: u64, k: usize) -> u64 {
    random_state.wrapping_add(k as u64)
}

/// Per-column errors of one repeat (`None`: no cell of that column was
/// masked or scorable)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatErrors {
    pub repeat: usize,
    pub seed: u64,
    pub masked_cells: usize,
    /// Masked cells the plan left unfilled, excluded from `errors`
    pub skipped_cells: usize,
    pub errors: Vec<Option<f64>>,
}

/// Aggregated diagnostics of one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticRow {
    pub column: String,
    /// Bias: mean error across repeats
    pub mean_error: f64,
    /// Stability: sample standard deviation across repeats; `None` with
    /// fewer than two contributing repeats
    pub sd_error: Option<f64>,
    pub n_repeats: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsResult {
    pub repeats: usize,
    pub scoring: Scoring,
    pub per_repeat: Vec<RepeatErrors>,
    pub rows: Vec<DiagnosticRow>,
}

impl DiagnosticsResult {
    /// Result of a disabled run
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Mean of the defined `sd_error` values
    pub fn average_sd_error(&self) -> Option<f64> {
        let sds: Vec<f64> = self.rows.iter().filter_map(|r| r.sd_error).collect();
        if sds.is_empty() {
            None
        } else {
            Some(sds.iter().sum::<f64>() / sds.len() as f64)
        }
    }
}

/// Repeats the masked validation of the resolved plan with independently
/// seeded masks
#[derive(Debug, Clone)]
pub struct DiagnosticsRunner {
    repeats: usize,
    mask_fraction: f64,
    scoring: Scoring,
    max_cells: usize,
    random_state: u64,
}

impl DiagnosticsRunner {
    pub fn new(repeats: usize, mask_fraction: f64, scoring: Scoring, random_state: u64) -> Self {
        Self {
            repeats,
            mask_fraction,
            scoring,
            max_cells: usize::MAX,
            random_state,
        }
    }

    pub fn with_max_cells(mut self, max_cells: usize) -> Self {
        self.max_cells = max_cells;
        self
    }

    pub fn from_config(config: &QcConfig) -> Self {
        let diag = &config.diagnostics;
        let runner = Self::new(diag.repeats, diag.mask_fraction, diag.scoring, config.diagnostics_seed());
        match diag.max_cells {
            Some(max) => runner.with_max_cells(max),
            None => runner,
        }
    }

    pub fn run(&self, x: &Array2<f64>, mask: &Array2<bool>, plan: &ImputationPlan) -> Result<DiagnosticsResult> {
        if self.repeats == 0 {
            return Ok(DiagnosticsResult::empty());
        }

        info!(repeats = self.repeats, seed = self.random_state, "Running imputation diagnostics");

        let per_repeat = (0..self.repeats)
            .into_par_iter()
            .map(|k| self.run_repeat(x, mask, plan, k))
            .collect::<Result<Vec<_>>>()?;

        let rows = plan
            .columns()
            .iter()
            .enumerate()
            .filter_map(|(j, column)| {
                let errors: Vec<f64> = per_repeat.iter().filter_map(|r| r.errors[j]).collect();
                aggregate(column, &errors)
            })
            .collect();

        Ok(DiagnosticsResult {
            repeats: self.repeats,
            scoring: self.scoring,
            per_repeat,
            rows,
        })
    }

    fn run_repeat(
        &self,
        x: &Array2<f64>,
        mask: &Array2<bool>,
        plan: &ImputationPlan,
        k: usize,
    ) -> Result<RepeatErrors> {
        let seed = repeat_seed(self.random_state, k);
        let cells = MaskSampler::new(self.mask_fraction, self.max_cells, seed).sample(mask);
        if cells.is_empty() {
            return Err(PhenoQcError::TuningError(format!(
                "diagnostics repeat {}: no observed cells available to mask",
                k
            )));
        }

        let hidden = hide_cells(mask, &cells);
        let completion = apply_plan(x, &hidden, plan)?;

        let mut skipped_cells = 0;
        let errors = (0..x.ncols())
            .map(|j| {
                let column_cells: Vec<(usize, usize)> =
                    cells.iter().copied().filter(|&(_, c)| c == j).collect();
                let scored = score_cells(self.scoring, &completion.values, x, &column_cells);
                skipped_cells += scored.skipped;
                scored.score.is_finite().then_some(scored.score)
            })
            .collect();

        if skipped_cells > 0 {
            warn!(repeat = k, seed, skipped = skipped_cells, "Masked cells left unfilled in diagnostics repeat");
        }

        Ok(RepeatErrors {
            repeat: k,
            seed,
            masked_cells: cells.len(),
            skipped_cells,
            errors,
        })
    }
}

fn aggregate(column: &str, errors: &[f64]) -> Option<DiagnosticRow> {
    if errors.is_empty() {
        return None;
    }
    let n = errors.len() as f64;
    let mean = errors.iter().sum::<f64>() / n;
    let sd = (errors.len() > 1).then(|| {
        let ss = errors.iter().map(|e| (e - mean).powi(2)).sum::<f64>();
        (ss / (n - 1.0)).sqrt()
    });
    Some(DiagnosticRow {
        column: column.to_string(),
        mean_error: mean,
        sd_error: sd,
        n_repeats: errors.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;
    use std::collections::BTreeMap;

    fn setup() -> (Array2<f64>, Array2<bool>, ImputationPlan) {
        let n = 30;
        let mut values = Vec::new();
        for i in 0..n {
            let t = i as f64;
            values.extend_from_slice(&[t, (t * 0.7).cos() * 3.0]);
        }
        let mut x = Array2::from_shape_vec((n, 2), values).unwrap();
        x[[2, 0]] = f64::NAN;
        let mask = x.mapv(|v| v.is_nan());
        let columns = vec!["a".to_string(), "b".to_string()];
        let plan = ImputationPlan::new(StrategyConfig::Mean, BTreeMap::new(), &columns).unwrap();
        (x, mask, plan)
    }

    #[test]
    fn test_repeat_seed() {
        assert_eq!(repeat_seed(42, 0), 42);
        assert_eq!(repeat_seed(42, 3), 45);
        assert_eq!(repeat_seed(u64::MAX, 1), 0);
    }

    #[test]
    fn test_aggregate_sample_sd() {
        let row = aggregate("a", &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(row.mean_error, 2.0);
        assert!((row.sd_error.unwrap() - 1.0).abs() < 1e-12);
        assert!(aggregate("a", &[1.0]).unwrap().sd_error.is_none());
        assert!(aggregate("a", &[]).is_none());
    }

    #[test]
    fn test_diagnostics_rows() {
        let (x, mask, plan) = setup();
        let result = DiagnosticsRunner::new(4, 0.2, Scoring::Mae, 7).run(&x, &mask, &plan).unwrap();
        assert_eq!(result.repeats, 4);
        assert_eq!(result.per_repeat.len(), 4);
        assert_eq!(result.per_repeat[2].seed, 9);
        assert_eq!(result.rows.len(), 2);
        assert!(result.rows.iter().all(|r| r.mean_error >= 0.0));
        assert!(result.per_repeat.iter().all(|r| r.skipped_cells == 0));
    }

    #[test]
    fn test_diagnostics_deterministic() {
        let (x, mask, plan) = setup();
        let runner = DiagnosticsRunner::new(5, 0.15, Scoring::Rmse, 3);
        let a = runner.run(&x, &mask, &plan).unwrap();
        let b = runner.run(&x, &mask, &plan).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_prefix_repeats_match() {
        // repeat k depends only on (random_state, k)
        let (x, mask, plan) = setup();
        let short = DiagnosticsRunner::new(2, 0.2, Scoring::Mae, 5).run(&x, &mask, &plan).unwrap();
        let long = DiagnosticsRunner::new(6, 0.2, Scoring::Mae, 5).run(&x, &mask, &plan).unwrap();
        assert_eq!(short.per_repeat[..], long.per_repeat[..2]);
    }

    #[test]
    fn test_zero_repeats_is_empty() {
        let (x, mask, plan) = setup();
        let result = DiagnosticsRunner::new(0, 0.2, Scoring::Mae, 5).run(&x, &mask, &plan).unwrap();
        assert!(result.is_empty());
    }
}
