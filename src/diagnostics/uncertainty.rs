//! Multiple-imputation uncertainty
//!
//! MICE is run `repeats` times with bootstrap seeds taken from
//! [`repeat_seed`]. Each originally missing cell gets the sample standard
//! deviation of its draws; columns report the mean and max of those.

use super::repeat_seed;
use crate::config::{MiceParams, QcConfig};
use crate::error::Result;
use crate::imputation::{Imputer, MiceImputer};
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyRow {
    pub column: String,
    /// Originally missing cells with at least two finite draws
    pub n_cells: usize,
    pub mean_sd: Option<f64>,
    pub max_sd: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyResult {
    pub repeats: usize,
    pub seed: u64,
    pub rows: Vec<UncertaintyRow>,
}

#[derive(Debug, Clone)]
pub struct MiUncertaintyRunner {
    repeats: usize,
    params: MiceParams,
    random_state: u64,
}

impl MiUncertaintyRunner {
    pub fn new(repeats: usize, params: MiceParams, random_state: u64) -> Self {
        Self {
            repeats,
            params,
            random_state,
        }
    }

    pub fn from_config(config: &QcConfig) -> Result<Self> {
        let section = &config.mi_uncertainty;
        Ok(Self::new(section.repeats, section.mice_params()?, config.mi_uncertainty_seed()))
    }

    /// One row per column with missing cells, in column order
    pub fn run(&self, x: &Array2<f64>, mask: &Array2<bool>, columns: &[String]) -> Result<UncertaintyResult> {
        info!(repeats = self.repeats, seed = self.random_state, "Running MI uncertainty");
        let draws = (0..self.repeats)
            .into_par_iter()
            .map(|k| {
                MiceImputer::new()
                    .with_max_iter(self.params.max_iter)
                    .with_bootstrap_seed(repeat_seed(self.random_state, k))
                    .complete(x, mask)
                    .map(|c| c.values)
            })
            .collect::<Result<Vec<_>>>()?;

        let rows = columns
            .iter()
            .enumerate()
            .filter(|(j, _)| mask.column(*j).iter().any(|&m| m))
            .map(|(j, column)| {
                let sds: Vec<f64> = (0..x.nrows())
                    .filter(|&i| mask[[i, j]])
                    .filter_map(|i| {
                        let values: Vec<f64> = draws
                            .iter()
                            .map(|d| d[[i, j]])
                            .filter(|v| v.is_finite())
                            .collect();
                        sample_sd(&values)
                    })
                    .collect();
                UncertaintyRow {
                    column: column.clone(),
                    n_cells: sds.len(),
                    mean_sd: (!sds.is_empty()).then(|| sds.iter().sum::<f64>() / sds.len() as f64),
                    max_sd: sds.iter().copied().reduce(f64::max),
                }
            })
            .collect();

        Ok(UncertaintyResult {
            repeats: self.repeats,
            seed: self.random_state,
            rows,
        })
    }
}

fn sample_sd(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let ss = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    Some((ss / (n - 1.0)).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Array2<f64>, Array2<bool>, Vec<String>) {
        let n = 40;
        let mut values = Vec::new();
        for i in 0..n {
            let t = i as f64;
            values.extend_from_slice(&[t, 2.0 * t + (t * 1.3).sin() * 4.0, (t * 0.4).cos()]);
        }
        let mut x = Array2::from_shape_vec((n, 3), values).unwrap();
        for i in [3, 11, 25] {
            x[[i, 1]] = f64::NAN;
        }
        let mask = x.mapv(|v| v.is_nan());
        (x, mask, vec!["a".into(), "b".into(), "c".into()])
    }

    #[test]
    fn test_sample_sd() {
        assert!((sample_sd(&[1.0, 2.0, 3.0]).unwrap() - 1.0).abs() < 1e-12);
        assert!(sample_sd(&[1.0]).is_none());
    }

    #[test]
    fn test_rows_only_for_missing_columns() {
        let (x, mask, columns) = setup();
        let params = MiceParams { max_iter: 4, random_state: None };
        let result = MiUncertaintyRunner::new(4, params, 11).run(&x, &mask, &columns).unwrap();
        assert_eq!(result.rows.len(), 1);
        let row = &result.rows[0];
        assert_eq!(row.column, "b");
        assert_eq!(row.n_cells, 3);
        assert!(row.mean_sd.unwrap() > 0.0);
        assert!(row.max_sd.unwrap() >= row.mean_sd.unwrap());
    }

    #[test]
    fn test_seeded_runs_repeat() {
        let (x, mask, columns) = setup();
        let params = MiceParams { max_iter: 3, random_state: None };
        let a = MiUncertaintyRunner::new(3, params, 5).run(&x, &mask, &columns).unwrap();
        let b = MiUncertaintyRunner::new(3, params, 5).run(&x, &mask, &columns).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_single_repeat_has_no_spread() {
        let (x, mask, columns) = setup();
        let result = MiUncertaintyRunner::new(1, MiceParams::default(), 5).run(&x, &mask, &columns).unwrap();
        assert_eq!(result.rows[0].n_cells, 0);
        assert!(result.rows[0].mean_sd.is_none());
    }
}
