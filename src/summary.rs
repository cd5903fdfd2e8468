//! Per-dataset QC summary and its exports
//!
//! The JSON document layout:
//!
//! ```text
//! imputation.global.{strategy,params}
//! imputation.per_column.<col>.{strategy,params}
//! imputation.tuning.{enabled,best,score,...}
//! quality_metrics.imputation_bias.rows[{column,mean_error}]
//! quality_metrics.imputation_stability.rows[{column,sd_error}]
//! quality_metrics.redundancy.rows[{column_a,column_b,type,score,method?}]
//! quality_metrics.imputation_shift.rows[...]
//! quality_metrics.imputation_uncertainty.rows[{column,n_cells,mean_sd,max_sd}]
//! quality_metrics.accuracy.rows[{row,column,value,minimum?,maximum?}]
//! quality_metrics.traceability.rows[{row,issue}]
//! quality_metrics.timeliness.rows[{row,issue,value?,lag_days?}]
//! ```

use crate::config::{CorrelationMethod, ImputationPlan, Scoring, StrategyConfig};
use crate::diagnostics::{DiagnosticsResult, ShiftRow, UncertaintyResult, UncertaintyRow};
use crate::engine::{RunContext, RunWarning};
use crate::error::{ErrorMarker, Result};
use crate::quality::{
    ClassDistribution, MissingnessReport, RangeViolation, RedundancyPair, TimelinessRow, TraceabilityIssue,
};
use crate::tuning::{TrialScore, TuningResult};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Outcome class of one dataset run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Run completed
    #[default]
    Processed,
    /// Loaded but rejected (configuration or data problem)
    Invalid,
    /// Could not be read or written
    Error,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Processed => "processed",
            FileStatus::Invalid => "invalid",
            FileStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategySummary {
    pub strategy: String,
    pub params: Map<String, Value>,
}

impl From<&StrategyConfig> for StrategySummary {
    fn from(config: &StrategyConfig) -> Self {
        Self {
            strategy: config.name().to_string(),
            params: config.params_json(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TuningSummary {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoring: Option<Scoring>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masked_cells: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub grid: Vec<TrialScore>,
    /// Set when tuning ran and failed; the configured parameters were used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorMarker>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImputationSummary {
    pub enabled: bool,
    /// Resolved global strategy (tuned parameters when tuning succeeded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global: Option<StrategySummary>,
    pub per_column: BTreeMap<String, StrategySummary>,
    pub tuning: TuningSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BiasRow {
    pub column: String,
    pub mean_error: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StabilityRow {
    pub column: String,
    pub sd_error: Option<f64>,
    pub n_repeats: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BiasMetric {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoring: Option<Scoring>,
    pub rows: Vec<BiasRow>,
}

/// Errors of one diagnostics repeat, keyed by column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepeatColumnError {
    pub column: String,
    pub error: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StabilityRepeat {
    pub repeat: usize,
    pub seed: u64,
    pub masked_cells: usize,
    pub skipped_cells: usize,
    pub errors: Vec<RepeatColumnError>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StabilityMetric {
    pub enabled: bool,
    pub repeats: usize,
    pub rows: Vec<StabilityRow>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub per_repeat: Vec<StabilityRepeat>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RedundancyMetric {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<CorrelationMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    pub rows: Vec<RedundancyPair>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ShiftMetric {
    pub enabled: bool,
    pub rows: Vec<ShiftRow>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UncertaintyMetric {
    pub enabled: bool,
    pub repeats: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub rows: Vec<UncertaintyRow>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AccuracyMetric {
    pub enabled: bool,
    pub rows: Vec<RangeViolation>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TraceabilityMetric {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub identifier_columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_column: Option<String>,
    pub rows: Vec<TraceabilityIssue>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TimelinessMetric {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_lag_days: Option<i64>,
    pub rows: Vec<TimelinessRow>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QualityMetrics {
    pub imputation_bias: BiasMetric,
    pub imputation_stability: StabilityMetric,
    pub redundancy: RedundancyMetric,
    pub imputation_shift: ShiftMetric,
    pub imputation_uncertainty: UncertaintyMetric,
    pub accuracy: AccuracyMetric,
    pub traceability: TraceabilityMetric,
    pub timeliness: TimelinessMetric,
}

/// Aggregate result of one dataset run. Built once by [`ResultAggregator`]
/// and not modified afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct QcSummary {
    pub dataset: String,
    pub status: FileStatus,
    pub rows: usize,
    pub eligible_columns: Vec<String>,
    pub imputation: ImputationSummary,
    pub quality_metrics: QualityMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missingness: Option<MissingnessReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_distribution: Option<ClassDistribution>,
    pub warnings: Vec<RunWarning>,
    pub errors: Vec<ErrorMarker>,
}

impl QcSummary {
    /// Summary of a run that stopped before any metric was computed
    pub fn failed(dataset: impl Into<String>, status: FileStatus, marker: ErrorMarker) -> Self {
        Self {
            dataset: dataset.into(),
            status,
            rows: 0,
            eligible_columns: Vec::new(),
            imputation: ImputationSummary::default(),
            quality_metrics: QualityMetrics::default(),
            missingness: None,
            class_distribution: None,
            warnings: Vec::new(),
            errors: vec![marker],
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    /// Tab-delimited metrics export:
    /// `metric  column_a  column_b  type  value  method`
    ///
    /// Row-level checks (accuracy, traceability, timeliness) put the row
    /// index in `column_b`. Backslash, tab and newline inside fields are
    /// written as `\\`, `\t` and `\n`.
    pub fn to_tsv(&self) -> String {
        let mut out = String::from("metric\tcolumn_a\tcolumn_b\ttype\tvalue\tmethod\n");
        let mut row = |metric: &str, a: &str, b: &str, kind: &str, value: String, method: &str| {
            // writing into a String cannot fail
            let _ = writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}\t{}",
                metric,
                tsv_escape(a),
                tsv_escape(b),
                tsv_escape(kind),
                tsv_escape(&value),
                method
            );
        };

        if let Some(missing) = &self.missingness {
            for c in &missing.columns {
                row("missing_count", &c.column, "", "", c.missing.to_string(), "");
            }
        }

        let scoring = self
            .quality_metrics
            .imputation_bias
            .scoring
            .map(|s| s.as_str())
            .unwrap_or("");
        for r in &self.quality_metrics.imputation_bias.rows {
            row("imputation_bias", &r.column, "", "mean_error", fmt_f64(r.mean_error), scoring);
        }
        for r in &self.quality_metrics.imputation_stability.rows {
            let value = r.sd_error.map(fmt_f64).unwrap_or_default();
            row("imputation_stability", &r.column, "", "sd_error", value, scoring);
        }

        for p in &self.quality_metrics.redundancy.rows {
            let kind = match p.relation {
                crate::quality::RelationType::Identical => "identical",
                crate::quality::RelationType::Correlated => "correlated",
            };
            let method = p.method.map(|m| m.as_str()).unwrap_or("");
            row("redundancy", &p.column_a, &p.column_b, kind, fmt_f64(p.score), method);
        }

        for s in &self.quality_metrics.imputation_shift.rows {
            if let Some(smd) = s.smd {
                row("imputation_shift", &s.column, "", "smd", fmt_f64(smd), "");
            }
            if let Some(ratio) = s.var_ratio {
                row("imputation_shift", &s.column, "", "var_ratio", fmt_f64(ratio), "");
            }
            row("imputation_shift", &s.column, "", "ks_pvalue", fmt_f64(s.ks_pvalue), "");
        }

        for u in &self.quality_metrics.imputation_uncertainty.rows {
            if let Some(sd) = u.mean_sd {
                row("imputation_uncertainty", &u.column, "", "mean_sd", fmt_f64(sd), "");
            }
            if let Some(sd) = u.max_sd {
                row("imputation_uncertainty", &u.column, "", "max_sd", fmt_f64(sd), "");
            }
        }

        for v in &self.quality_metrics.accuracy.rows {
            row("accuracy", &v.column, &v.row.to_string(), "out_of_range", fmt_f64(v.value), "");
        }
        let ids = self.quality_metrics.traceability.identifier_columns.join(",");
        for t in &self.quality_metrics.traceability.rows {
            row("traceability", &ids, &t.row.to_string(), t.issue.as_str(), String::new(), "");
        }
        let date_column = self.quality_metrics.timeliness.date_column.as_deref().unwrap_or("");
        for t in &self.quality_metrics.timeliness.rows {
            let value = t.lag_days.map(|d| d.to_string()).or_else(|| t.value.clone()).unwrap_or_default();
            row("timeliness", date_column, &t.row.to_string(), t.issue.as_str(), value, "");
        }

        if let Some(dist) = &self.class_distribution {
            for c in &dist.classes {
                row("class_proportion", &dist.column, "", &c.label, fmt_f64(c.proportion), "");
            }
        }
        out
    }

    pub fn write_tsv(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_tsv())?;
        Ok(())
    }
}

fn fmt_f64(v: f64) -> String {
    format!("{:.6}", v)
}

/// Keep one record per line and one field per tab
fn tsv_escape(field: &str) -> std::borrow::Cow<'_, str> {
    if !field.contains(|c: char| matches!(c, '\\' | '\t' | '\n' | '\r')) {
        return std::borrow::Cow::Borrowed(field);
    }
    let mut out = String::with_capacity(field.len() + 4);
    for c in field.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    std::borrow::Cow::Owned(out)
}

/// Assembles a [`QcSummary`] from the stage outputs. Structural only.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    dataset: String,
    rows: usize,
    eligible_columns: Vec<String>,
    plan: Option<ImputationPlan>,
    tuning_enabled: bool,
    tuning: Option<TuningResult>,
    tuning_error: Option<ErrorMarker>,
    diagnostics_enabled: bool,
    diagnostics: Option<DiagnosticsResult>,
    redundancy: Option<(CorrelationMethod, f64, Vec<RedundancyPair>)>,
    shift: Option<Vec<ShiftRow>>,
    uncertainty: Option<UncertaintyResult>,
    accuracy: Option<Vec<RangeViolation>>,
    traceability: Option<(Vec<String>, Option<String>, Vec<TraceabilityIssue>)>,
    timeliness: Option<(String, i64, Vec<TimelinessRow>)>,
    missingness: Option<MissingnessReport>,
    class_distribution: Option<ClassDistribution>,
}

impl ResultAggregator {
    pub fn new(dataset: impl Into<String>, rows: usize) -> Self {
        Self {
            dataset: dataset.into(),
            rows,
            ..Default::default()
        }
    }

    pub fn with_eligible_columns(mut self, columns: Vec<String>) -> Self {
        self.eligible_columns = columns;
        self
    }

    pub fn with_plan(mut self, plan: ImputationPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn with_tuning(
        mut self,
        enabled: bool,
        result: Option<TuningResult>,
        error: Option<ErrorMarker>,
    ) -> Self {
        self.tuning_enabled = enabled;
        self.tuning = result;
        self.tuning_error = error;
        self
    }

    pub fn with_diagnostics(mut self, enabled: bool, result: Option<DiagnosticsResult>) -> Self {
        self.diagnostics_enabled = enabled;
        self.diagnostics = result;
        self
    }

    pub fn with_redundancy(mut self, method: CorrelationMethod, threshold: f64, pairs: Vec<RedundancyPair>) -> Self {
        self.redundancy = Some((method, threshold, pairs));
        self
    }

    pub fn with_shift(mut self, rows: Vec<ShiftRow>) -> Self {
        self.shift = Some(rows);
        self
    }

    pub fn with_uncertainty(mut self, result: UncertaintyResult) -> Self {
        self.uncertainty = Some(result);
        self
    }

    pub fn with_accuracy(mut self, rows: Vec<RangeViolation>) -> Self {
        self.accuracy = Some(rows);
        self
    }

    pub fn with_traceability(
        mut self,
        identifiers: Vec<String>,
        source_column: Option<String>,
        rows: Vec<TraceabilityIssue>,
    ) -> Self {
        self.traceability = Some((identifiers, source_column, rows));
        self
    }

    pub fn with_timeliness(mut self, date_column: String, max_lag_days: i64, rows: Vec<TimelinessRow>) -> Self {
        self.timeliness = Some((date_column, max_lag_days, rows));
        self
    }

    pub fn with_missingness(mut self, report: MissingnessReport) -> Self {
        self.missingness = Some(report);
        self
    }

    pub fn with_class_distribution(mut self, report: Option<ClassDistribution>) -> Self {
        self.class_distribution = report;
        self
    }

    pub fn finalize(self, ctx: RunContext) -> QcSummary {
        let imputation = match &self.plan {
            Some(plan) => ImputationSummary {
                enabled: true,
                global: Some(StrategySummary::from(plan.global())),
                per_column: plan
                    .overrides()
                    .iter()
                    .map(|(col, cfg)| (col.clone(), StrategySummary::from(cfg)))
                    .collect(),
                tuning: TuningSummary {
                    enabled: self.tuning_enabled,
                    best: self.tuning.as_ref().map(|t| t.best.clone()),
                    score: self.tuning.as_ref().map(|t| t.score),
                    scoring: self.tuning.as_ref().map(|t| t.scoring),
                    masked_cells: self.tuning.as_ref().map(|t| t.masked_cells),
                    grid: self.tuning.map(|t| t.grid).unwrap_or_default(),
                    error: self.tuning_error,
                },
            },
            None => ImputationSummary::default(),
        };

        let diagnostics = self.diagnostics.unwrap_or_default();
        let imputation_bias = BiasMetric {
            enabled: self.diagnostics_enabled,
            scoring: self.diagnostics_enabled.then_some(diagnostics.scoring),
            rows: diagnostics
                .rows
                .iter()
                .map(|r| BiasRow {
                    column: r.column.clone(),
                    mean_error: r.mean_error,
                })
                .collect(),
        };
        let diagnosed_columns: &[String] = self.plan.as_ref().map(|p| p.columns()).unwrap_or(&[]);
        let imputation_stability = StabilityMetric {
            enabled: self.diagnostics_enabled,
            repeats: diagnostics.repeats,
            rows: diagnostics
                .rows
                .iter()
                .map(|r| StabilityRow {
                    column: r.column.clone(),
                    sd_error: r.sd_error,
                    n_repeats: r.n_repeats,
                })
                .collect(),
            per_repeat: diagnostics
                .per_repeat
                .iter()
                .map(|r| StabilityRepeat {
                    repeat: r.repeat,
                    seed: r.seed,
                    masked_cells: r.masked_cells,
                    skipped_cells: r.skipped_cells,
                    errors: diagnosed_columns
                        .iter()
                        .zip(r.errors.iter())
                        .map(|(column, error)| RepeatColumnError {
                            column: column.clone(),
                            error: *error,
                        })
                        .collect(),
                })
                .collect(),
        };

        let redundancy = match self.redundancy {
            Some((method, threshold, rows)) => RedundancyMetric {
                enabled: true,
                method: Some(method),
                threshold: Some(threshold),
                rows,
            },
            None => RedundancyMetric::default(),
        };
        let imputation_shift = ShiftMetric {
            enabled: self.shift.is_some(),
            rows: self.shift.unwrap_or_default(),
        };
        let imputation_uncertainty = match self.uncertainty {
            Some(u) => UncertaintyMetric {
                enabled: true,
                repeats: u.repeats,
                seed: Some(u.seed),
                rows: u.rows,
            },
            None => UncertaintyMetric::default(),
        };
        let accuracy = AccuracyMetric {
            enabled: self.accuracy.is_some(),
            rows: self.accuracy.unwrap_or_default(),
        };
        let traceability = match self.traceability {
            Some((identifier_columns, source_column, rows)) => TraceabilityMetric {
                enabled: true,
                identifier_columns,
                source_column,
                rows,
            },
            None => TraceabilityMetric::default(),
        };
        let timeliness = match self.timeliness {
            Some((date_column, max_lag_days, rows)) => TimelinessMetric {
                enabled: true,
                date_column: Some(date_column),
                max_lag_days: Some(max_lag_days),
                rows,
            },
            None => TimelinessMetric::default(),
        };

        let (warnings, errors) = ctx.into_parts();
        QcSummary {
            dataset: self.dataset,
            status: FileStatus::Processed,
            rows: self.rows,
            eligible_columns: self.eligible_columns,
            imputation,
            quality_metrics: QualityMetrics {
                imputation_bias,
                imputation_stability,
                redundancy,
                imputation_shift,
                imputation_uncertainty,
                accuracy,
                traceability,
                timeliness,
            },
            missingness: self.missingness,
            class_distribution: self.class_distribution,
            warnings,
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{DiagnosticRow, RepeatErrors};
    use crate::quality::RelationType;

    fn plan() -> ImputationPlan {
        let columns = vec!["a".to_string(), "b".to_string()];
        let mut overrides = BTreeMap::new();
        overrides.insert("b".to_string(), StrategyConfig::Median);
        ImputationPlan::new(StrategyConfig::Mean, overrides, &columns).unwrap()
    }

    #[test]
    fn test_disabled_sections_are_recorded() {
        let summary = ResultAggregator::new("d", 4)
            .with_plan(plan())
            .with_tuning(false, None, None)
            .with_diagnostics(false, None)
            .finalize(RunContext::new());
        let json: Value = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["imputation"]["global"]["strategy"], "mean");
        assert_eq!(json["imputation"]["per_column"]["b"]["strategy"], "median");
        assert_eq!(json["imputation"]["tuning"]["enabled"], false);
        assert!(json["imputation"]["tuning"].get("best").is_none());
        assert_eq!(json["quality_metrics"]["imputation_bias"]["enabled"], false);
        assert_eq!(json["quality_metrics"]["imputation_bias"]["rows"], Value::Array(vec![]));
    }

    #[test]
    fn test_rows_and_tsv() {
        let diagnostics = DiagnosticsResult {
            repeats: 3,
            scoring: Scoring::Mae,
            per_repeat: Vec::new(),
            rows: vec![DiagnosticRow {
                column: "a".into(),
                mean_error: 0.5,
                sd_error: Some(0.1),
                n_repeats: 3,
            }],
        };
        let pair = RedundancyPair {
            column_a: "a".into(),
            column_b: "b".into(),
            relation: RelationType::Identical,
            score: 1.0,
            method: None,
        };
        let summary = ResultAggregator::new("d", 4)
            .with_plan(plan())
            .with_diagnostics(true, Some(diagnostics))
            .with_redundancy(CorrelationMethod::Pearson, 0.98, vec![pair])
            .finalize(RunContext::new());

        let json: Value = serde_json::to_value(&summary).unwrap();
        let bias = &json["quality_metrics"]["imputation_bias"]["rows"][0];
        assert_eq!(bias["column"], "a");
        assert_eq!(bias["mean_error"], 0.5);
        assert_eq!(json["quality_metrics"]["imputation_stability"]["rows"][0]["sd_error"], 0.1);
        let red = &json["quality_metrics"]["redundancy"]["rows"][0];
        assert_eq!(red["type"], "identical");
        assert!(red.get("method").is_none());

        let stability = &json["quality_metrics"]["imputation_stability"];
        assert!(stability.get("per_repeat").is_none());

        let tsv = summary.to_tsv();
        assert!(tsv.starts_with("metric\tcolumn_a"));
        assert!(tsv.contains("redundancy\ta\tb\tidentical\t1.000000\t\n"));
        assert!(tsv.contains("imputation_bias\ta\t\tmean_error\t0.500000\tMAE\n"));
    }

    #[test]
    fn test_per_repeat_keyed_by_column() {
        let diagnostics = DiagnosticsResult {
            repeats: 2,
            scoring: Scoring::Mae,
            per_repeat: vec![
                RepeatErrors { repeat: 0, seed: 42, masked_cells: 3, skipped_cells: 0, errors: vec![Some(0.25), None] },
                RepeatErrors { repeat: 1, seed: 43, masked_cells: 3, skipped_cells: 1, errors: vec![Some(0.5), Some(1.0)] },
            ],
            rows: Vec::new(),
        };
        let summary = ResultAggregator::new("d", 4)
            .with_plan(plan())
            .with_diagnostics(true, Some(diagnostics))
            .finalize(RunContext::new());
        let json: Value = serde_json::to_value(&summary).unwrap();
        let per_repeat = &json["quality_metrics"]["imputation_stability"]["per_repeat"];
        assert_eq!(per_repeat[0]["seed"], 42);
        assert_eq!(per_repeat[0]["errors"][0]["column"], "a");
        assert_eq!(per_repeat[0]["errors"][0]["error"], 0.25);
        assert_eq!(per_repeat[0]["errors"][1]["error"], Value::Null);
        assert_eq!(per_repeat[1]["skipped_cells"], 1);
        assert_eq!(per_repeat[1]["errors"][1]["column"], "b");
    }

    #[test]
    fn test_tsv_escapes_text_fields() {
        let report = crate::quality::class_distribution(
            "status",
            &[crate::data::Cell::from("case\tA"), crate::data::Cell::from("multi\nline")],
            0.1,
        );
        let summary = ResultAggregator::new("d", 2)
            .with_class_distribution(Some(report))
            .finalize(RunContext::new());
        let tsv = summary.to_tsv();
        assert!(tsv.contains("class_proportion\tstatus\t\tcase\\tA\t0.500000\t\n"));
        assert!(tsv.contains("class_proportion\tstatus\t\tmulti\\nline\t0.500000\t\n"));
        for line in tsv.lines() {
            assert_eq!(line.split('\t').count(), 6, "{:?}", line);
        }
        assert_eq!(tsv.lines().count(), 3);
        assert_eq!(tsv_escape("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_row_level_checks_and_uncertainty() {
        use crate::diagnostics::{UncertaintyResult, UncertaintyRow};
        use crate::quality::{TimelinessIssue, TraceIssue};

        let summary = ResultAggregator::new("d", 4)
            .with_accuracy(vec![RangeViolation {
                row: 2,
                column: "Age".into(),
                value: 150.0,
                minimum: Some(0.0),
                maximum: Some(120.0),
            }])
            .with_traceability(
                vec!["PatientID".into()],
                None,
                vec![TraceabilityIssue { row: 1, issue: TraceIssue::DuplicateIdentifier }],
            )
            .with_timeliness(
                "VisitDate".into(),
                365,
                vec![TimelinessRow {
                    row: 3,
                    issue: TimelinessIssue::MissingOrInvalidDate,
                    value: Some("soon".into()),
                    lag_days: None,
                }],
            )
            .with_uncertainty(UncertaintyResult {
                repeats: 3,
                seed: 42,
                rows: vec![UncertaintyRow { column: "b".into(), n_cells: 2, mean_sd: Some(0.5), max_sd: Some(0.75) }],
            })
            .finalize(RunContext::new());

        let json: Value = serde_json::to_value(&summary).unwrap();
        let metrics = &json["quality_metrics"];
        assert_eq!(json["status"], "processed");
        assert_eq!(metrics["accuracy"]["rows"][0]["value"], 150.0);
        assert_eq!(metrics["traceability"]["rows"][0]["issue"], "duplicate_identifier");
        assert_eq!(metrics["timeliness"]["max_lag_days"], 365);
        assert_eq!(metrics["imputation_uncertainty"]["rows"][0]["max_sd"], 0.75);
        assert_eq!(metrics["redundancy"]["enabled"], false);

        let tsv = summary.to_tsv();
        assert!(tsv.contains("accuracy\tAge\t2\tout_of_range\t150.000000\t\n"));
        assert!(tsv.contains("traceability\tPatientID\t1\tduplicate_identifier\t\t\n"));
        assert!(tsv.contains("timeliness\tVisitDate\t3\tmissing_or_invalid_date\tsoon\t\n"));
        assert!(tsv.contains("imputation_uncertainty\tb\t\tmax_sd\t0.750000\t\n"));
    }

    #[test]
    fn test_failed_summary() {
        let marker = ErrorMarker { kind: "load".into(), message: "cannot parse".into() };
        let summary = QcSummary::failed("broken.csv", FileStatus::Error, marker);
        let json: Value = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["errors"][0]["kind"], "load");
        assert_eq!(json["quality_metrics"]["accuracy"]["enabled"], false);
    }
}
