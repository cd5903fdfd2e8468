//! QC run configuration
//!
//! Mirrors the external configuration document:
//!
//! ```yaml
//! imputation:
//!   strategy: knn
//!   params: { n_neighbors: 5 }
//!   per_column: { Age: { strategy: median } }
//!   tuning: { enable: true, grid: { n_neighbors: [3, 5, 7] } }
//! diagnostics: { enable: true, repeats: 5 }
//! redundancy: { threshold: 0.98, method: pearson }
//! label_column: class
//! protected_columns: [PatientID]
//! quality_metrics: { checks: [accuracy, traceability] }
//! accuracy: { ranges: { Age: { minimum: 0, maximum: 120 } } }
//! timeliness: { date_column: VisitDate, max_lag_days: 365 }
//! mi_uncertainty: { enable: true, repeats: 3, params: { max_iter: 6 } }
//! ```
//!
//! Raw parameter bags stay as JSON maps here; [`resolver`] turns them into
//! typed [`StrategyConfig`]s.

pub mod resolver;

pub use resolver::{
    ConfigurationResolver, ImputationPlan, KnnParams, KnnWeights, MiceParams, StrategyConfig,
    SvdParams,
};

use crate::error::{PhenoQcError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Error metric for masked-validation scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Scoring {
    #[default]
    #[serde(rename = "MAE", alias = "mae")]
    Mae,
    #[serde(rename = "RMSE", alias = "rmse")]
    Rmse,
}

impl Scoring {
    /// Score imputed values against hidden truth
    pub fn score(&self, imputed: &[f64], truth: &[f64]) -> f64 {
        let n = imputed.len().min(truth.len());
        if n == 0 {
            return f64::NAN;
        }
        let pairs = imputed.iter().zip(truth.iter());
        match self {
            Scoring::Mae => pairs.map(|(a, b)| (a - b).abs()).sum::<f64>() / n as f64,
            Scoring::Rmse => (pairs.map(|(a, b)| (a - b).powi(2)).sum::<f64>() / n as f64).sqrt(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scoring::Mae => "MAE",
            Scoring::Rmse => "RMSE",
        }
    }
}

/// Correlation method for redundancy detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMethod {
    #[default]
    Pearson,
    Spearman,
}

impl CorrelationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationMethod::Pearson => "pearson",
            CorrelationMethod::Spearman => "spearman",
        }
    }
}

/// Per-column strategy override, as written in the config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnOverride {
    pub strategy: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// `imputation.tuning`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningSection {
    pub enable: bool,
    pub mask_fraction: f64,
    pub scoring: Scoring,
    pub max_cells: usize,
    pub random_state: u64,
    /// Parameter name -> candidate values, in declaration order
    pub grid: Map<String, Value>,
}

impl Default for TuningSection {
    fn default() -> Self {
        Self {
            enable: false,
            mask_fraction: 0.1,
            scoring: Scoring::Mae,
            max_cells: 50_000,
            random_state: 42,
            grid: Map::new(),
        }
    }
}

/// `imputation`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImputationSection {
    pub strategy: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub per_column: BTreeMap<String, ColumnOverride>,
    #[serde(default)]
    pub tuning: TuningSection,
}

impl ImputationSection {
    pub fn new(strategy: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            params: Map::new(),
            per_column: BTreeMap::new(),
            tuning: TuningSection::default(),
        }
    }

    pub fn with_param(mut self, name: &str, value: Value) -> Self {
        self.params.insert(name.to_string(), value);
        self
    }

    pub fn with_override(mut self, column: &str, strategy: &str, params: Map<String, Value>) -> Self {
        self.per_column.insert(
            column.to_string(),
            ColumnOverride {
                strategy: strategy.to_string(),
                params,
            },
        );
        self
    }

    pub fn with_tuning(mut self, tuning: TuningSection) -> Self {
        self.tuning = tuning;
        self
    }
}

/// `diagnostics`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsSection {
    pub enable: bool,
    pub repeats: usize,
    pub mask_fraction: f64,
    pub scoring: Scoring,
    pub max_cells: Option<usize>,
    /// Falls back to `imputation.tuning.random_state`
    pub random_state: Option<u64>,
}

impl Default for DiagnosticsSection {
    fn default() -> Self {
        Self {
            enable: false,
            repeats: 5,
            mask_fraction: 0.1,
            scoring: Scoring::Mae,
            max_cells: None,
            random_state: None,
        }
    }
}

/// `redundancy`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedundancySection {
    pub enable: bool,
    pub threshold: f64,
    pub method: CorrelationMethod,
    /// Absolute tolerance for "identical" numeric columns
    pub identical_epsilon: f64,
}

impl Default for RedundancySection {
    fn default() -> Self {
        Self {
            enable: true,
            threshold: 0.98,
            method: CorrelationMethod::Pearson,
            identical_epsilon: 1e-12,
        }
    }
}

/// `quality_metrics.imputation_shift`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShiftSection {
    pub enable: bool,
    pub smd_threshold: f64,
    pub var_ratio_low: f64,
    pub var_ratio_high: f64,
    pub ks_alpha: f64,
}

impl Default for ShiftSection {
    fn default() -> Self {
        Self {
            enable: true,
            smd_threshold: 0.10,
            var_ratio_low: 0.5,
            var_ratio_high: 2.0,
            ks_alpha: 0.05,
        }
    }
}

/// Table-level quality checks selectable per run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityCheck {
    Accuracy,
    Redundancy,
    Traceability,
    Timeliness,
}

impl QualityCheck {
    pub const ALL: [QualityCheck; 4] = [
        QualityCheck::Accuracy,
        QualityCheck::Redundancy,
        QualityCheck::Traceability,
        QualityCheck::Timeliness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityCheck::Accuracy => "accuracy",
            QualityCheck::Redundancy => "redundancy",
            QualityCheck::Traceability => "traceability",
            QualityCheck::Timeliness => "timeliness",
        }
    }
}

/// `quality_metrics`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityMetricsSection {
    /// Checks to run; every check by default
    pub checks: Vec<QualityCheck>,
    pub imputation_shift: ShiftSection,
}

impl Default for QualityMetricsSection {
    fn default() -> Self {
        Self {
            checks: QualityCheck::ALL.to_vec(),
            imputation_shift: ShiftSection::default(),
        }
    }
}

impl QualityMetricsSection {
    pub fn runs(&self, check: QualityCheck) -> bool {
        self.checks.contains(&check)
    }
}

/// Allowed range of one column
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeRule {
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

/// `accuracy`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccuracySection {
    pub ranges: BTreeMap<String, RangeRule>,
}

impl AccuracySection {
    /// Collect `properties.<col>.{minimum,maximum}` from a JSON schema.
    /// Properties without either bound are skipped.
    pub fn from_json_schema(schema: &Value) -> Self {
        let mut ranges = BTreeMap::new();
        if let Some(props) = schema.get("properties").and_then(Value::as_object) {
            for (column, rules) in props {
                let rule = RangeRule {
                    minimum: rules.get("minimum").and_then(Value::as_f64),
                    maximum: rules.get("maximum").and_then(Value::as_f64),
                };
                if rule.minimum.is_some() || rule.maximum.is_some() {
                    ranges.insert(column.clone(), rule);
                }
            }
        }
        Self { ranges }
    }

    /// Load range rules from a JSON schema file
    pub fn from_schema_path(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let schema: Value = serde_json::from_reader(reader)?;
        Ok(Self::from_json_schema(&schema))
    }
}

/// `traceability`; identifiers come from `identifier_columns`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceabilitySection {
    /// Column that must carry non-null provenance
    pub source_column: Option<String>,
}

/// `timeliness`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelinessSection {
    pub date_column: Option<String>,
    pub max_lag_days: i64,
    /// Reference date; today (UTC) when unset
    pub as_of: Option<NaiveDate>,
}

impl Default for TimelinessSection {
    fn default() -> Self {
        Self {
            date_column: None,
            max_lag_days: 365,
            as_of: None,
        }
    }
}

/// `mi_uncertainty`: spread of repeated MICE draws per imputed cell
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MiUncertaintySection {
    pub enable: bool,
    pub repeats: usize,
    /// MICE parameters (`max_iter`, `random_state`)
    pub params: Map<String, Value>,
}

impl Default for MiUncertaintySection {
    fn default() -> Self {
        Self {
            enable: false,
            repeats: 5,
            params: Map::new(),
        }
    }
}

impl MiUncertaintySection {
    /// Typed MICE parameters
    pub fn mice_params(&self) -> Result<MiceParams> {
        match StrategyConfig::from_parts("mice", &self.params)? {
            StrategyConfig::Mice(p) => Ok(p),
            _ => Ok(MiceParams::default()),
        }
    }
}

/// `class_distribution`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassDistributionSection {
    /// Overrides the top-level `label_column` for this report
    pub label_column: Option<String>,
    pub warn_threshold: f64,
}

impl Default for ClassDistributionSection {
    fn default() -> Self {
        Self {
            label_column: None,
            warn_threshold: 0.10,
        }
    }
}

/// Root configuration for one QC run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QcConfig {
    pub imputation: Option<ImputationSection>,
    pub diagnostics: DiagnosticsSection,
    pub redundancy: RedundancySection,
    pub label_column: Option<String>,
    pub protected_columns: Vec<String>,
    pub identifier_columns: Vec<String>,
    pub quality_metrics: QualityMetricsSection,
    pub class_distribution: ClassDistributionSection,
    pub accuracy: AccuracySection,
    pub traceability: TraceabilitySection,
    pub timeliness: TimelinessSection,
    pub mi_uncertainty: MiUncertaintySection,
}

impl QcConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let reader = BufReader::new(File::open(path)?);
        let config: QcConfig = match ext.as_str() {
            "json" => serde_json::from_reader(reader)?,
            "yaml" | "yml" => serde_yaml::from_reader(reader)?,
            other => {
                return Err(PhenoQcError::ConfigError(format!(
                    "unsupported configuration format '{}', use YAML or JSON",
                    other
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse from a YAML (or JSON, which is valid YAML) string
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: QcConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_imputation(mut self, imputation: ImputationSection) -> Self {
        self.imputation = Some(imputation);
        self
    }

    pub fn with_diagnostics(mut self, repeats: usize) -> Self {
        self.diagnostics.enable = true;
        self.diagnostics.repeats = repeats;
        self
    }

    pub fn with_redundancy(mut self, threshold: f64, method: CorrelationMethod) -> Self {
        self.redundancy.threshold = threshold;
        self.redundancy.method = method;
        self
    }

    pub fn with_label_column(mut self, label: &str) -> Self {
        self.label_column = Some(label.to_string());
        self
    }

    pub fn with_protected_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protected_columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn with_quality_checks(mut self, checks: &[QualityCheck]) -> Self {
        self.quality_metrics.checks = checks.to_vec();
        self
    }

    pub fn with_identifier_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identifier_columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn with_mi_uncertainty(mut self, repeats: usize) -> Self {
        self.mi_uncertainty.enable = true;
        self.mi_uncertainty.repeats = repeats;
        self
    }

    /// Seed for MI uncertainty repeats: `mi_uncertainty.params.random_state`,
    /// else the diagnostics seed
    pub fn mi_uncertainty_seed(&self) -> u64 {
        self.mi_uncertainty
            .params
            .get("random_state")
            .and_then(Value::as_u64)
            .unwrap_or_else(|| self.diagnostics_seed())
    }

    /// Seed for diagnostics repeats
    pub fn diagnostics_seed(&self) -> u64 {
        self.diagnostics.random_state.unwrap_or_else(|| {
            self.imputation
                .as_ref()
                .map(|i| i.tuning.random_state)
                .unwrap_or(42)
        })
    }

    /// Label used by the class distribution report
    pub fn class_label(&self) -> Option<&str> {
        self.class_distribution
            .label_column
            .as_deref()
            .or(self.label_column.as_deref())
    }

    /// Range checks on scalar settings. Strategy names and parameters are
    /// checked later by the resolver.
    pub fn validate(&self) -> Result<()> {
        if let Some(imp) = &self.imputation {
            if imp.tuning.enable {
                check_fraction("imputation.tuning.mask_fraction", imp.tuning.mask_fraction)?;
            }
        }
        if self.diagnostics.enable {
            check_fraction("diagnostics.mask_fraction", self.diagnostics.mask_fraction)?;
            if self.diagnostics.repeats == 0 {
                return Err(PhenoQcError::InvalidParameter {
                    name: "diagnostics.repeats".to_string(),
                    value: "0".to_string(),
                    reason: "must be >= 1".to_string(),
                });
            }
        }
        let t = self.redundancy.threshold;
        if !(0.0..=1.0).contains(&t) {
            return Err(PhenoQcError::InvalidParameter {
                name: "redundancy.threshold".to_string(),
                value: t.to_string(),
                reason: "must be in [0, 1]".to_string(),
            });
        }
        if self.redundancy.identical_epsilon < 0.0 {
            return Err(PhenoQcError::InvalidParameter {
                name: "redundancy.identical_epsilon".to_string(),
                value: self.redundancy.identical_epsilon.to_string(),
                reason: "must be >= 0".to_string(),
            });
        }
        for (column, rule) in &self.accuracy.ranges {
            if let (Some(min), Some(max)) = (rule.minimum, rule.maximum) {
                if min > max {
                    return Err(PhenoQcError::InvalidParameter {
                        name: format!("accuracy.ranges.{}", column),
                        value: format!("[{}, {}]", min, max),
                        reason: "minimum must not exceed maximum".to_string(),
                    });
                }
            }
        }
        let shift = &self.quality_metrics.imputation_shift;
        if shift.smd_threshold < 0.0 {
            return Err(PhenoQcError::InvalidParameter {
                name: "quality_metrics.imputation_shift.smd_threshold".to_string(),
                value: shift.smd_threshold.to_string(),
                reason: "must be >= 0".to_string(),
            });
        }
        if !(shift.var_ratio_low > 0.0 && shift.var_ratio_low <= shift.var_ratio_high) {
            return Err(PhenoQcError::InvalidParameter {
                name: "quality_metrics.imputation_shift.var_ratio_low".to_string(),
                value: format!("[{}, {}]", shift.var_ratio_low, shift.var_ratio_high),
                reason: "must satisfy 0 < low <= high".to_string(),
            });
        }
        check_fraction("quality_metrics.imputation_shift.ks_alpha", shift.ks_alpha)?;
        let imbalance = self.class_distribution.warn_threshold;
        if !(0.0..=1.0).contains(&imbalance) {
            return Err(PhenoQcError::InvalidParameter {
                name: "class_distribution.warn_threshold".to_string(),
                value: imbalance.to_string(),
                reason: "must be in [0, 1]".to_string(),
            });
        }
        if self.timeliness.max_lag_days < 0 {
            return Err(PhenoQcError::InvalidParameter {
                name: "timeliness.max_lag_days".to_string(),
                value: self.timeliness.max_lag_days.to_string(),
                reason: "must be >= 0".to_string(),
            });
        }
        if self.mi_uncertainty.enable {
            if self.mi_uncertainty.repeats == 0 {
                return Err(PhenoQcError::InvalidParameter {
                    name: "mi_uncertainty.repeats".to_string(),
                    value: "0".to_string(),
                    reason: "must be >= 1".to_string(),
                });
            }
            self.mi_uncertainty.mice_params()?;
        }
        Ok(())
    }
}

fn check_fraction(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(PhenoQcError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: "must be in (0, 1]".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
imputation:
  strategy: knn
  params:
    n_neighbors: 5
  per_column:
    Creatinine:
      strategy: mice
      params:
        max_iter: 8
  tuning:
    enable: true
    mask_fraction: 0.1
    scoring: MAE
    max_cells: 20000
    random_state: 42
    grid:
      weights: [uniform, distance]
      n_neighbors: [3, 5, 7, 9]
diagnostics:
  enable: true
  repeats: 5
  scoring: RMSE
redundancy:
  threshold: 0.95
  method: spearman
label_column: class
protected_columns: [PatientID, VisitID]
"#;

    #[test]
    fn test_parse_yaml() {
        let config = QcConfig::from_yaml_str(YAML).unwrap();
        let imp = config.imputation.as_ref().unwrap();
        assert_eq!(imp.strategy, "knn");
        assert_eq!(imp.per_column["Creatinine"].strategy, "mice");
        assert!(imp.tuning.enable);
        assert_eq!(imp.tuning.max_cells, 20000);
        // grid keeps declaration order
        let keys: Vec<&String> = imp.tuning.grid.keys().collect();
        assert_eq!(keys, ["weights", "n_neighbors"]);
        assert_eq!(config.diagnostics.scoring, Scoring::Rmse);
        assert_eq!(config.redundancy.method, CorrelationMethod::Spearman);
        assert_eq!(config.protected_columns.len(), 2);
        assert_eq!(config.diagnostics_seed(), 42);
    }

    #[test]
    fn test_defaults() {
        let config = QcConfig::default();
        assert!(config.imputation.is_none());
        assert!(!config.diagnostics.enable);
        assert_eq!(config.redundancy.threshold, 0.98);
        assert_eq!(config.class_distribution.warn_threshold, 0.10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_mask_fraction() {
        let config = QcConfig::from_yaml_str("diagnostics:\n  enable: true\n  mask_fraction: 0.0\n");
        assert!(matches!(config, Err(PhenoQcError::InvalidParameter { .. })));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "x = 1").unwrap();
        let err = QcConfig::from_path(&path).unwrap_err();
        assert!(matches!(err, PhenoQcError::ConfigError(_)));
    }

    #[test]
    fn test_quality_sections() {
        let yaml = r#"
quality_metrics:
  checks: [accuracy, timeliness]
accuracy:
  ranges:
    Age: { minimum: 0, maximum: 120 }
traceability:
  source_column: Site
timeliness:
  date_column: VisitDate
  max_lag_days: 30
  as_of: 2024-03-01
mi_uncertainty:
  enable: true
  repeats: 3
  params: { max_iter: 6, random_state: 9 }
"#;
        let config = QcConfig::from_yaml_str(yaml).unwrap();
        assert!(config.quality_metrics.runs(QualityCheck::Accuracy));
        assert!(!config.quality_metrics.runs(QualityCheck::Redundancy));
        assert_eq!(config.accuracy.ranges["Age"].maximum, Some(120.0));
        assert_eq!(config.traceability.source_column.as_deref(), Some("Site"));
        assert_eq!(config.timeliness.as_of, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(config.mi_uncertainty.mice_params().unwrap().max_iter, 6);
        assert_eq!(config.mi_uncertainty_seed(), 9);
    }

    #[test]
    fn test_all_checks_by_default() {
        let config = QcConfig::default();
        assert_eq!(config.quality_metrics.checks, QualityCheck::ALL.to_vec());
        assert_eq!(config.timeliness.max_lag_days, 365);
        assert_eq!(config.mi_uncertainty_seed(), 42);
    }

    #[test]
    fn test_ranges_from_json_schema() {
        let schema = serde_json::json!({
            "properties": {
                "Age": { "type": "number", "minimum": 0, "maximum": 120 },
                "Height_cm": { "minimum": 30.5 },
                "Sex": { "type": "string" }
            }
        });
        let section = AccuracySection::from_json_schema(&schema);
        assert_eq!(section.ranges.len(), 2);
        assert_eq!(section.ranges["Height_cm"], RangeRule { minimum: Some(30.5), maximum: None });
    }

    #[test]
    fn test_invalid_quality_settings() {
        let inverted = QcConfig::from_yaml_str("accuracy:\n  ranges:\n    Age: { minimum: 5, maximum: 1 }\n");
        assert!(matches!(inverted, Err(PhenoQcError::InvalidParameter { .. })));
        let zero = QcConfig::from_yaml_str("mi_uncertainty:\n  enable: true\n  repeats: 0\n");
        assert!(matches!(zero, Err(PhenoQcError::InvalidParameter { .. })));
        let unknown = QcConfig::from_yaml_str("mi_uncertainty:\n  enable: true\n  params: { n_neighbors: 3 }\n");
        assert!(unknown.is_err());
    }

    #[test]
    fn test_scoring_metrics() {
        let imputed = [1.0, 2.0, 3.0];
        let truth = [2.0, 2.0, 5.0];
        assert!((Scoring::Mae.score(&imputed, &truth) - 1.0).abs() < 1e-12);
        assert!((Scoring::Rmse.score(&imputed, &truth) - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }
}
