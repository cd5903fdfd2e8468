//! Quick tuner: mask-and-score hyperparameter search
//!
//! Hides a seeded sample of observed cells, completes the matrix with every
//! grid combination and keeps the one with the lowest error on the hidden
//! cells.

mod grid;
mod masking;

pub use grid::ParamGrid;
pub use masking::{hide_cells, score_cells, MaskSampler, MaskedScore};

use crate::config::{Scoring, StrategyConfig, TuningSection};
use crate::error::{PhenoQcError, Result};
use crate::imputation::executor_for;
use ndarray::Array2;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use tracing::{debug, info, warn};

/// Score of one grid combination
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialScore {
    pub params: Map<String, Value>,
    pub score: f64,
    /// Masked cells this combination left unfilled and that were not scored
    pub skipped_cells: usize,
}

/// Outcome of a tuning run
#[derive(Debug, Clone, Serialize)]
pub struct TuningResult {
    pub strategy: String,
    /// Winning grid combination
    pub best: Map<String, Value>,
    pub score: f64,
    pub scoring: Scoring,
    pub masked_cells: usize,
    /// Every combination in enumeration order
    pub grid: Vec<TrialScore>,
    /// Base strategy with the winning combination applied
    #[serde(skip)]
    pub best_config: StrategyConfig,
}

/// Mask-and-score grid search
#[derive(Debug, Clone)]
pub struct QuickTuner {
    mask_fraction: f64,
    scoring: Scoring,
    max_cells: usize,
    random_state: u64,
}

impl QuickTuner {
    pub fn new(mask_fraction: f64, scoring: Scoring, max_cells: usize, random_state: u64) -> Self {
        Self {
            mask_fraction,
            scoring,
            max_cells,
            random_state,
        }
    }

    pub fn from_section(section: &TuningSection) -> Self {
        Self::new(
            section.mask_fraction,
            section.scoring,
            section.max_cells,
            section.random_state,
        )
    }

    /// Tune `base` over `grid` on matrix `x` with original missingness `mask`
    pub fn tune(
        &self,
        x: &Array2<f64>,
        mask: &Array2<bool>,
        base: &StrategyConfig,
        grid: &ParamGrid,
    ) -> Result<TuningResult> {
        if grid.is_empty() {
            return Err(PhenoQcError::TuningError(format!(
                "empty parameter grid for strategy '{}'",
                base.name()
            )));
        }
        let candidates = grid.candidates(base)?;

        let cells = MaskSampler::new(self.mask_fraction, self.max_cells, self.random_state).sample(mask);
        if cells.is_empty() {
            return Err(PhenoQcError::TuningError(
                "no observed cells available to mask".to_string(),
            ));
        }
        let hidden = hide_cells(mask, &cells);

        info!(
            strategy = base.name(),
            combinations = candidates.len(),
            masked_cells = cells.len(),
            "Starting quick tuning"
        );

        // Each combination is a pure function of its parameters
        let trials = candidates
            .par_iter()
            .map(|(params, config)| {
                let completion = executor_for(config).complete(x, &hidden)?;
                let scored = score_cells(self.scoring, &completion.values, x, &cells);
                if scored.skipped > 0 {
                    warn!(
                        params = %serde_json::Value::Object(params.clone()),
                        skipped = scored.skipped,
                        "Masked cells left unfilled, scored on the remainder"
                    );
                }
                debug!(params = %serde_json::Value::Object(params.clone()), score = scored.score, "Scored combination");
                Ok(TrialScore {
                    params: params.clone(),
                    score: scored.score,
                    skipped_cells: scored.skipped,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let best_idx = best_index(&trials).ok_or_else(|| {
            PhenoQcError::TuningError("no combination produced a finite score".to_string())
        })?;

        let result = TuningResult {
            strategy: base.name().to_string(),
            best: trials[best_idx].params.clone(),
            score: trials[best_idx].score,
            scoring: self.scoring,
            masked_cells: cells.len(),
            best_config: candidates[best_idx].1,
            grid: trials,
        };
        info!(
            best = %serde_json::Value::Object(result.best.clone()),
            score = result.score,
            "Quick tuning finished"
        );
        Ok(result)
    }
}

/// Lowest finite score; the earliest combination wins ties
fn best_index(trials: &[TrialScore]) -> Option<usize> {
    trials
        .iter()
        .enumerate()
        .filter(|(_, t)| t.score.is_finite())
        .min_by(|(i, a), (j, b)| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(Ordering::Equal)
                .then(i.cmp(j))
        })
        .map(|(i, _)| i)
}
