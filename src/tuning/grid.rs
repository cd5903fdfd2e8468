//! Parameter grid enumeration

use crate::config::StrategyConfig;
use crate::error::{PhenoQcError, Result};
use serde_json::{Map, Value};

/// Cartesian product of candidate parameter values.
///
/// Enumeration is outer-to-inner by parameter declaration order, values in
/// listed order: `{a: [1, 2], b: [x, y]}` yields `(1,x) (1,y) (2,x) (2,y)`.
#[derive(Debug, Clone, Default)]
pub struct ParamGrid {
    axes: Vec<(String, Vec<Value>)>,
}

impl ParamGrid {
    /// Build from a config map. A scalar is a single candidate.
    pub fn from_map(grid: &Map<String, Value>) -> Self {
        let axes = grid
            .iter()
            .map(|(name, values)| {
                let candidates = match values {
                    Value::Array(items) => items.clone(),
                    other => vec![other.clone()],
                };
                (name.clone(), candidates)
            })
            .collect();
        Self { axes }
    }

    pub fn len(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes.iter().map(|(_, v)| v.len()).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All combinations in enumeration order
    pub fn combinations(&self) -> Vec<Map<String, Value>> {
        if self.is_empty() {
            return Vec::new();
        }
        let mut combos = vec![Map::new()];
        for (name, values) in &self.axes {
            combos = combos
                .into_iter()
                .flat_map(|partial| {
                    values.iter().map(move |v| {
                        let mut next = partial.clone();
                        next.insert(name.clone(), v.clone());
                        next
                    })
                })
                .collect();
        }
        combos
    }

    /// Combinations applied on top of `base`, validated against its
    /// parameter set
    pub fn candidates(&self, base: &StrategyConfig) -> Result<Vec<(Map<String, Value>, StrategyConfig)>> {
        self.combinations()
            .into_iter()
            .map(|combo| {
                let config = combo
                    .iter()
                    .try_fold(*base, |cfg, (k, v)| cfg.with_param(k, v))
                    .map_err(|e| match e {
                        PhenoQcError::ConfigError(msg) => {
                            PhenoQcError::ConfigError(format!("tuning grid: {}", msg))
                        }
                        other => other,
                    })?;
                Ok((combo, config))
            })
            .collect()
    }
}
