//! Distribution shift between observed and imputed values of a column

use crate::config::ShiftSection;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftRow {
    pub column: String,
    pub n_observed: usize,
    pub n_imputed: usize,
    pub mean_observed: f64,
    pub mean_imputed: f64,
    /// `(mean_imp - mean_obs) / sd_obs`; `None` when `sd_obs` is zero
    pub smd: Option<f64>,
    /// `var_imp / var_obs`; `None` when either variance is undefined or
    /// `var_obs` is zero
    pub var_ratio: Option<f64>,
    pub ks_statistic: f64,
    pub ks_pvalue: f64,
    pub warn: bool,
}

/// Compares imputed cells against the observed cells of the same column
#[derive(Debug, Clone)]
pub struct ShiftAnalyzer {
    smd_threshold: f64,
    var_ratio_low: f64,
    var_ratio_high: f64,
    ks_alpha: f64,
}

impl ShiftAnalyzer {
    pub fn new(section: &ShiftSection) -> Self {
        Self {
            smd_threshold: section.smd_threshold,
            var_ratio_low: section.var_ratio_low,
            var_ratio_high: section.var_ratio_high,
            ks_alpha: section.ks_alpha,
        }
    }

    /// One row per column having both observed and imputed cells
    pub fn analyze(&self, completed: &Array2<f64>, mask: &Array2<bool>, columns: &[String]) -> Vec<ShiftRow> {
        columns
            .iter()
            .enumerate()
            .filter_map(|(j, name)| {
                let mut observed = Vec::new();
                let mut imputed = Vec::new();
                for (v, &m) in completed.column(j).iter().zip(mask.column(j).iter()) {
                    if !v.is_finite() {
                        continue;
                    }
                    if m {
                        imputed.push(*v);
                    } else {
                        observed.push(*v);
                    }
                }
                if observed.is_empty() || imputed.is_empty() {
                    return None;
                }
                Some(self.compare(name, &observed, &imputed))
            })
            .collect()
    }

    fn compare(&self, column: &str, observed: &[f64], imputed: &[f64]) -> ShiftRow {
        let mean_obs = mean(observed);
        let mean_imp = mean(imputed);
        let var_obs = variance(observed);
        let var_imp = variance(imputed);

        let smd = var_obs
            .map(f64::sqrt)
            .filter(|sd| *sd > 0.0)
            .map(|sd| (mean_imp - mean_obs) / sd);
        let var_ratio = match (var_imp, var_obs) {
            (Some(vi), Some(vo)) if vo > 0.0 => Some(vi / vo),
            _ => None,
        };
        let ks_statistic = ks_statistic(observed, imputed);
        let ks_pvalue = ks_pvalue(ks_statistic, observed.len(), imputed.len());

        let warn = smd.map_or(false, |s| s.abs() >= self.smd_threshold)
            || var_ratio.map_or(false, |r| r < self.var_ratio_low || r > self.var_ratio_high)
            || ks_pvalue < self.ks_alpha;

        ShiftRow {
            column: column.to_string(),
            n_observed: observed.len(),
            n_imputed: imputed.len(),
            mean_observed: mean_obs,
            mean_imputed: mean_imp,
            smd,
            var_ratio,
            ks_statistic,
            ks_pvalue,
            warn,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n - 1)
fn variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    Some(values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64)
}

fn ecdf(sorted: &[f64], x: f64) -> f64 {
    sorted.partition_point(|&v| v <= x) as f64 / sorted.len() as f64
}

/// Two-sample KS statistic: largest gap between the empirical CDFs
pub fn ks_statistic(a: &[f64], b: &[f64]) -> f64 {
    let mut a_sorted = a.to_vec();
    let mut b_sorted = b.to_vec();
    a_sorted.sort_by(|x, y| x.partial_cmp(y).unwrap_or(Ordering::Equal));
    b_sorted.sort_by(|x, y| x.partial_cmp(y).unwrap_or(Ordering::Equal));

    let mut combined: Vec<f64> = a_sorted.iter().chain(b_sorted.iter()).copied().collect();
    combined.sort_by(|x, y| x.partial_cmp(y).unwrap_or(Ordering::Equal));
    combined.dedup();

    combined
        .iter()
        .map(|&x| (ecdf(&a_sorted, x) - ecdf(&b_sorted, x)).abs())
        .fold(0.0, f64::max)
}

/// Asymptotic p-value from the Kolmogorov distribution with the usual
/// small-sample correction on the effective size
pub fn ks_pvalue(d: f64, n1: usize, n2: usize) -> f64 {
    if n1 == 0 || n2 == 0 {
        return 1.0;
    }
    let ne = (n1 * n2) as f64 / (n1 + n2) as f64;
    let sqrt_ne = ne.sqrt();
    let lambda = (sqrt_ne + 0.12 + 0.11 / sqrt_ne) * d;
    if lambda < 1e-3 {
        return 1.0;
    }

    let mut sum = 0.0;
    let mut sign = 1.0;
    for j in 1..=100 {
        let term = sign * (-2.0 * (j * j) as f64 * lambda * lambda).exp();
        sum += term;
        if term.abs() < 1e-12 {
            break;
        }
        sign = -sign;
    }
    (2.0 * sum).clamp(0.0, 1.0)
}
