//! Configuration resolution: raw strategy names and parameter bags become
//! typed [`StrategyConfig`]s, merged into one [`ImputationPlan`].

use crate::config::ImputationSection;
use crate::error::{PhenoQcError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Supported strategy names
pub const STRATEGIES: [&str; 6] = ["mean", "median", "mode", "knn", "mice", "svd"];

/// Neighbor weighting for KNN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnnWeights {
    #[default]
    Uniform,
    Distance,
}

impl KnnWeights {
    pub fn as_str(&self) -> &'static str {
        match self {
            KnnWeights::Uniform => "uniform",
            KnnWeights::Distance => "distance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnnParams {
    pub n_neighbors: usize,
    pub weights: KnnWeights,
}

impl Default for KnnParams {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            weights: KnnWeights::Uniform,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiceParams {
    pub max_iter: usize,
    /// Accepted and recorded; the chained estimator is deterministic
    pub random_state: Option<u64>,
}

impl Default for MiceParams {
    fn default() -> Self {
        Self {
            max_iter: 10,
            random_state: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SvdParams {
    /// `None` means `min(rows, cols) - 1`, at least 1
    pub rank: Option<usize>,
    pub max_iters: usize,
}

impl Default for SvdParams {
    fn default() -> Self {
        Self {
            rank: None,
            max_iters: 100,
        }
    }
}

/// A strategy with its validated parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyConfig {
    Mean,
    Median,
    Mode,
    Knn(KnnParams),
    Mice(MiceParams),
    Svd(SvdParams),
}

impl StrategyConfig {
    /// Parse a strategy name and its parameter bag
    pub fn from_parts(name: &str, params: &Map<String, Value>) -> Result<Self> {
        let base = match name.to_lowercase().as_str() {
            "mean" => StrategyConfig::Mean,
            "median" => StrategyConfig::Median,
            "mode" => StrategyConfig::Mode,
            "knn" => StrategyConfig::Knn(KnnParams::default()),
            "mice" => StrategyConfig::Mice(MiceParams::default()),
            "svd" => StrategyConfig::Svd(SvdParams::default()),
            other => {
                return Err(PhenoQcError::ConfigError(format!(
                    "unknown imputation strategy '{}', expected one of {}",
                    other,
                    STRATEGIES.join(", ")
                )))
            }
        };
        params
            .iter()
            .try_fold(base, |cfg, (key, value)| cfg.with_param(key, value))
    }

    pub fn name(&self) -> &'static str {
        match self {
            StrategyConfig::Mean => "mean",
            StrategyConfig::Median => "median",
            StrategyConfig::Mode => "mode",
            StrategyConfig::Knn(_) => "knn",
            StrategyConfig::Mice(_) => "mice",
            StrategyConfig::Svd(_) => "svd",
        }
    }

    /// Parameter names this strategy accepts
    pub fn supported_params(&self) -> &'static [&'static str] {
        match self {
            StrategyConfig::Mean | StrategyConfig::Median | StrategyConfig::Mode => &[],
            StrategyConfig::Knn(_) => &["n_neighbors", "weights", "metric"],
            StrategyConfig::Mice(_) => &["max_iter", "random_state"],
            StrategyConfig::Svd(_) => &["rank", "max_iters"],
        }
    }

    /// Return a copy with one parameter set, validating name and value
    pub fn with_param(self, key: &str, value: &Value) -> Result<Self> {
        let unsupported = || {
            PhenoQcError::ConfigError(format!(
                "parameter '{}' is not supported by strategy '{}'",
                key,
                self.name()
            ))
        };
        match (self, key) {
            (StrategyConfig::Knn(mut p), "n_neighbors") => {
                p.n_neighbors = positive_int(key, value)?;
                Ok(StrategyConfig::Knn(p))
            }
            (StrategyConfig::Knn(mut p), "weights") => {
                p.weights = match value.as_str().map(str::to_lowercase).as_deref() {
                    Some("uniform") => KnnWeights::Uniform,
                    Some("distance") => KnnWeights::Distance,
                    _ => return Err(invalid(key, value, "expected 'uniform' or 'distance'")),
                };
                Ok(StrategyConfig::Knn(p))
            }
            (StrategyConfig::Knn(p), "metric") => match value.as_str() {
                Some("nan_euclidean") => Ok(StrategyConfig::Knn(p)),
                _ => Err(invalid(key, value, "only 'nan_euclidean' is supported")),
            },
            (StrategyConfig::Mice(mut p), "max_iter") => {
                p.max_iter = positive_int(key, value)?;
                Ok(StrategyConfig::Mice(p))
            }
            (StrategyConfig::Mice(mut p), "random_state") => {
                p.random_state = Some(
                    value
                        .as_u64()
                        .ok_or_else(|| invalid(key, value, "expected a non-negative integer"))?,
                );
                Ok(StrategyConfig::Mice(p))
            }
            (StrategyConfig::Svd(mut p), "rank") => {
                p.rank = Some(positive_int(key, value)?);
                Ok(StrategyConfig::Svd(p))
            }
            (StrategyConfig::Svd(mut p), "max_iters") => {
                p.max_iters = positive_int(key, value)?;
                Ok(StrategyConfig::Svd(p))
            }
            _ => Err(unsupported()),
        }
    }

    /// Parameters as a JSON map, for summaries
    pub fn params_json(&self) -> Map<String, Value> {
        let mut map = Map::new();
        match self {
            StrategyConfig::Mean | StrategyConfig::Median | StrategyConfig::Mode => {}
            StrategyConfig::Knn(p) => {
                map.insert("n_neighbors".into(), Value::from(p.n_neighbors));
                map.insert("weights".into(), Value::from(p.weights.as_str()));
            }
            StrategyConfig::Mice(p) => {
                map.insert("max_iter".into(), Value::from(p.max_iter));
                if let Some(seed) = p.random_state {
                    map.insert("random_state".into(), Value::from(seed));
                }
            }
            StrategyConfig::Svd(p) => {
                if let Some(rank) = p.rank {
                    map.insert("rank".into(), Value::from(rank));
                }
                map.insert("max_iters".into(), Value::from(p.max_iters));
            }
        }
        map
    }
}

fn invalid(key: &str, value: &Value, reason: &str) -> PhenoQcError {
    PhenoQcError::ConfigError(format!(
        "invalid value {} for parameter '{}': {}",
        value, key, reason
    ))
}

fn positive_int(key: &str, value: &Value) -> Result<usize> {
    match value.as_u64() {
        Some(v) if v >= 1 => Ok(v as usize),
        _ => Err(invalid(key, value, "expected an integer >= 1")),
    }
}

/// Global strategy plus per-column overrides, resolved against the
/// eligible columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ImputationPlan {
    global: StrategyConfig,
    overrides: BTreeMap<String, StrategyConfig>,
    columns: Vec<String>,
}

impl ImputationPlan {
    /// Build a plan; every override must name an eligible column
    pub fn new(
        global: StrategyConfig,
        overrides: BTreeMap<String, StrategyConfig>,
        eligible: &[String],
    ) -> Result<Self> {
        if let Some(unknown) = overrides.keys().find(|c| !eligible.contains(c)) {
            return Err(PhenoQcError::ConfigError(format!(
                "per-column override references column '{}' which is not an eligible numeric feature",
                unknown
            )));
        }
        Ok(Self {
            global,
            overrides,
            columns: eligible.to_vec(),
        })
    }

    pub fn global(&self) -> &StrategyConfig {
        &self.global
    }

    pub fn overrides(&self) -> &BTreeMap<String, StrategyConfig> {
        &self.overrides
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Resolved strategy for a column: override if present, else global
    pub fn strategy_for(&self, column: &str) -> &StrategyConfig {
        self.overrides.get(column).unwrap_or(&self.global)
    }

    /// Column indices grouped by identical resolved strategy, groups in
    /// order of first appearance.
    pub fn groups(&self) -> Vec<(StrategyConfig, Vec<usize>)> {
        let mut groups: Vec<(StrategyConfig, Vec<usize>)> = Vec::new();
        for (j, column) in self.columns.iter().enumerate() {
            let strategy = *self.strategy_for(column);
            match groups.iter_mut().find(|(s, _)| *s == strategy) {
                Some((_, cols)) => cols.push(j),
                None => groups.push((strategy, vec![j])),
            }
        }
        groups
    }

    /// Copy of this plan with the global strategy replaced
    pub fn with_global(&self, global: StrategyConfig) -> Self {
        Self {
            global,
            overrides: self.overrides.clone(),
            columns: self.columns.clone(),
        }
    }
}

/// Turns an [`ImputationSection`] into an [`ImputationPlan`].
pub struct ConfigurationResolver;

impl ConfigurationResolver {
    pub fn resolve(section: &ImputationSection, eligible: &[String]) -> Result<ImputationPlan> {
        let global = StrategyConfig::from_parts(&section.strategy, &section.params)?;

        let overrides = section
            .per_column
            .iter()
            .map(|(column, ov)| {
                StrategyConfig::from_parts(&ov.strategy, &ov.params)
                    .map(|cfg| (column.clone(), cfg))
                    .map_err(|e| match e {
                        PhenoQcError::ConfigError(msg) => {
                            PhenoQcError::ConfigError(format!("column '{}': {}", column, msg))
                        }
                        other => other,
                    })
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        ImputationPlan::new(global, overrides, eligible)
    }
}
