//! Single-dataset QC run
//!
//! Resolve configuration, build the numeric matrix, impute (optionally
//! tuned), run diagnostics and the selected quality checks, then aggregate
//! into a [`QcSummary`].

use crate::config::{ConfigurationResolver, QcConfig, QualityCheck};
use crate::data::{MatrixBuilder, RoleAssignment, Table};
use crate::diagnostics::{DiagnosticsRunner, MiUncertaintyRunner, ShiftAnalyzer};
use crate::error::{ErrorMarker, PhenoQcError, Result};
use crate::imputation::apply_plan;
use crate::io::load_table;
use crate::quality::{
    check_traceability, class_distribution, AccuracyChecker, MissingnessReport, RedundancyDetector,
    TimelinessChecker,
};
use crate::summary::{QcSummary, ResultAggregator};
use crate::tuning::{ParamGrid, QuickTuner};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// A recovered problem recorded during a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunWarning {
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    pub message: String,
}

/// Run-scoped collector of warnings and error markers.
///
/// One per dataset run, owned by the caller and consumed by the
/// [`ResultAggregator`].
#[derive(Debug, Default)]
pub struct RunContext {
    warnings: Vec<RunWarning>,
    errors: Vec<ErrorMarker>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, stage: &str, column: Option<&str>, row: Option<usize>, message: impl Into<String>) {
        let message = message.into();
        warn!(stage, column = ?column, row = ?row, "{}", message);
        self.warnings.push(RunWarning {
            stage: stage.to_string(),
            column: column.map(str::to_string),
            row,
            message,
        });
    }

    /// Record a non-fatal stage failure and return its marker
    pub fn record_error(&mut self, stage: &str, err: &PhenoQcError) -> ErrorMarker {
        warn!(stage, kind = err.kind(), error = %err, "Stage failed, continuing");
        let marker = ErrorMarker {
            kind: err.kind().to_string(),
            message: format!("{}: {}", stage, err),
        };
        self.errors.push(marker.clone());
        marker
    }

    pub fn warnings(&self) -> &[RunWarning] {
        &self.warnings
    }

    pub fn errors(&self) -> &[ErrorMarker] {
        &self.errors
    }

    pub fn into_parts(self) -> (Vec<RunWarning>, Vec<ErrorMarker>) {
        (self.warnings, self.errors)
    }
}

/// QC engine for one dataset at a time
#[derive(Debug, Clone)]
pub struct QcEngine {
    config: QcConfig,
}

impl QcEngine {
    pub fn new(config: QcConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QcConfig {
        &self.config
    }

    /// Load a file and run
    pub fn run_path(&self, path: impl AsRef<Path>) -> Result<QcSummary> {
        let path = path.as_ref();
        let table = load_table(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.run_table(&name, &table)
    }

    /// Run on an in-memory table.
    ///
    /// Configuration problems and an empty eligible matrix are returned as
    /// errors before any computation. Tuning and diagnostics failures are
    /// recorded in the summary instead.
    pub fn run_table(&self, dataset: &str, table: &Table) -> Result<QcSummary> {
        let config = &self.config;
        config.validate()?;
        let mut ctx = RunContext::new();

        let roles = RoleAssignment {
            identifiers: config.identifier_columns.clone(),
            label: config.label_column.clone(),
            protected: config.protected_columns.clone(),
        };
        let specs = roles.infer_specs(table);
        let builder = MatrixBuilder::new()
            .with_label_column(config.label_column.as_deref())
            .with_protected(config.protected_columns.iter().cloned());
        let eligible = builder.eligible_columns(&specs);

        // Resolve everything configurable up front
        let plan = match &config.imputation {
            Some(section) => {
                let plan = ConfigurationResolver::resolve(section, &eligible)?;
                if section.tuning.enable {
                    ParamGrid::from_map(&section.tuning.grid).candidates(plan.global())?;
                }
                Some(plan)
            }
            None => None,
        };

        let matrix = builder.build(table, &specs)?;
        info!(
            dataset,
            rows = matrix.nrows(),
            columns = matrix.ncols(),
            missing = matrix.missing_count(),
            "Built numeric matrix"
        );
        let x = matrix.values();
        let mask = matrix.mask();

        let mut aggregator = ResultAggregator::new(dataset, table.n_rows())
            .with_eligible_columns(matrix.columns().to_vec());

        let mut completed = None;
        if let (Some(section), Some(plan)) = (&config.imputation, plan) {
            let mut plan = plan;
            let mut tuning_result = None;
            let mut tuning_error = None;

            if section.tuning.enable {
                let grid = ParamGrid::from_map(&section.tuning.grid);
                match QuickTuner::from_section(&section.tuning).tune(x, mask, plan.global(), &grid) {
                    Ok(result) => {
                        plan = plan.with_global(result.best_config);
                        tuning_result = Some(result);
                    }
                    Err(err) => tuning_error = Some(ctx.record_error("tuning", &err)),
                }
            }
            info!(
                strategy = plan.global().name(),
                overrides = plan.overrides().len(),
                "Resolved imputation plan"
            );

            let completion = apply_plan(x, mask, &plan)?;
            for w in &completion.warnings {
                ctx.warn("imputation", Some(matrix.columns()[w.column].as_str()), w.row, w.message.clone());
            }

            let diagnostics = if config.diagnostics.enable {
                match DiagnosticsRunner::from_config(config).run(x, mask, &plan) {
                    Ok(result) => Some(result),
                    Err(err) => {
                        ctx.record_error("diagnostics", &err);
                        None
                    }
                }
            } else {
                None
            };

            if config.quality_metrics.imputation_shift.enable {
                let rows = ShiftAnalyzer::new(&config.quality_metrics.imputation_shift).analyze(
                    &completion.values,
                    mask,
                    matrix.columns(),
                );
                aggregator = aggregator.with_shift(rows);
            }

            aggregator = aggregator
                .with_plan(plan)
                .with_tuning(section.tuning.enable, tuning_result, tuning_error)
                .with_diagnostics(config.diagnostics.enable, diagnostics);
            completed = Some(completion.values);
        } else if config.diagnostics.enable {
            ctx.warn("diagnostics", None, None, "skipped: no imputation strategy configured");
            aggregator = aggregator.with_diagnostics(true, None);
        }

        if config.mi_uncertainty.enable {
            let result = MiUncertaintyRunner::from_config(config)
                .and_then(|runner| runner.run(x, mask, matrix.columns()));
            match result {
                Ok(result) => aggregator = aggregator.with_uncertainty(result),
                Err(err) => {
                    ctx.record_error("mi_uncertainty", &err);
                }
            }
        }

        aggregator = aggregator.with_missingness(MissingnessReport::from_matrix(&matrix, completed.as_ref()));

        let checks = &config.quality_metrics;
        if checks.runs(QualityCheck::Redundancy) && config.redundancy.enable {
            let values = completed.as_ref().unwrap_or(x);
            let pairs = RedundancyDetector::from_section(&config.redundancy).detect(values, matrix.columns());
            aggregator = aggregator.with_redundancy(config.redundancy.method, config.redundancy.threshold, pairs);
        }

        if checks.runs(QualityCheck::Accuracy) && !config.accuracy.ranges.is_empty() {
            let checker = AccuracyChecker::new(config.accuracy.ranges.clone());
            for column in checker.missing_columns(table) {
                ctx.warn("accuracy", Some(column.as_str()), None, "range rule column not found");
            }
            aggregator = aggregator.with_accuracy(checker.check(table));
        }

        if checks.runs(QualityCheck::Traceability) && !config.identifier_columns.is_empty() {
            let source = config.traceability.source_column.as_deref();
            match check_traceability(table, &config.identifier_columns, source) {
                Ok(rows) => {
                    if let Some(source) = source.filter(|s| table.column(s).is_none()) {
                        ctx.warn("traceability", Some(source), None, "source column not found");
                    }
                    aggregator = aggregator.with_traceability(
                        config.identifier_columns.clone(),
                        config.traceability.source_column.clone(),
                        rows,
                    );
                }
                Err(err) => {
                    ctx.record_error("traceability", &err);
                }
            }
        }

        if checks.runs(QualityCheck::Timeliness) {
            if let Some(date_column) = &config.timeliness.date_column {
                match table.column(date_column) {
                    Some(cells) => {
                        let timeliness = &config.timeliness;
                        let rows = TimelinessChecker::from_reference(timeliness.max_lag_days, timeliness.as_of)
                            .check(cells);
                        aggregator =
                            aggregator.with_timeliness(date_column.clone(), timeliness.max_lag_days, rows);
                    }
                    None => ctx.warn("timeliness", Some(date_column.as_str()), None, "date column not found"),
                }
            }
        }

        let class_report = match config.class_label() {
            Some(label) => match table.column(label) {
                Some(cells) => Some(class_distribution(
                    label,
                    cells,
                    config.class_distribution.warn_threshold,
                )),
                None => {
                    ctx.warn("class_distribution", Some(label), None, "label column not found");
                    None
                }
            },
            None => None,
        };

        let summary = aggregator.with_class_distribution(class_report).finalize(ctx);
        info!(
            dataset,
            warnings = summary.warnings.len(),
            errors = summary.errors.len(),
            "QC run finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImputationSection;
    use crate::data::Cell;

    fn table() -> Table {
        Table::from_numeric_rows(
            &["a", "b"],
            &[
                vec![Some(1.0), Some(2.0)],
                vec![None, Some(4.0)],
                vec![Some(3.0), None],
                vec![Some(5.0), Some(6.0)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_run_context_records() {
        let mut ctx = RunContext::new();
        ctx.warn("imputation", Some("a"), Some(1), "fallback");
        let marker = ctx.record_error("tuning", &PhenoQcError::TuningError("empty grid".into()));
        assert_eq!(marker.kind, "tuning");
        assert!(marker.message.starts_with("tuning: "));
        assert_eq!(ctx.warnings().len(), 1);
        assert_eq!(ctx.errors().len(), 1);
    }

    #[test]
    fn test_mean_run() {
        let config = QcConfig::new().with_imputation(ImputationSection::new("mean"));
        let summary = QcEngine::new(config).run_table("t", &table()).unwrap();
        assert!(summary.imputation.enabled);
        let missing = summary.missingness.unwrap();
        assert_eq!(missing.flagged_records_before, 2);
        assert_eq!(missing.flagged_records_after, 0);
        assert!(summary.errors.is_empty());
    }

    #[test]
    fn test_unknown_strategy_fails_early() {
        let config = QcConfig::new().with_imputation(ImputationSection::new("nope"));
        let err = QcEngine::new(config).run_table("t", &table()).unwrap_err();
        assert!(matches!(err, PhenoQcError::ConfigError(_)));
    }

    #[test]
    fn test_knn_shortfall_reaches_summary_warnings() {
        let config = QcConfig::new()
            .with_imputation(ImputationSection::new("knn").with_param("n_neighbors", serde_json::json!(5)));
        let summary = QcEngine::new(config).run_table("t", &table()).unwrap();

        assert_eq!(summary.warnings.len(), 2);
        let first = &summary.warnings[0];
        assert_eq!(first.stage, "imputation");
        assert_eq!(first.column.as_deref(), Some("a"));
        assert_eq!(first.row, Some(1));
        assert!(first.message.contains("only"));
        let second = &summary.warnings[1];
        assert_eq!((second.column.as_deref(), second.row), (Some("b"), Some(2)));
        assert_eq!(summary.missingness.unwrap().flagged_records_after, 0);
    }

    fn visits() -> Table {
        table()
            .with_column(
                "PatientID",
                vec![Cell::from("P1"), Cell::from("P1"), Cell::from("P2"), Cell::Null],
            )
            .unwrap()
            .with_column(
                "VisitDate",
                vec![
                    Cell::from("2024-01-10"),
                    Cell::from("2021-06-01"),
                    Cell::from("not_a_date"),
                    Cell::from("2023-12-24"),
                ],
            )
            .unwrap()
    }

    fn quality_config() -> QcConfig {
        let mut config = QcConfig::new().with_identifier_columns(["PatientID"]);
        config
            .accuracy
            .ranges
            .insert("a".to_string(), crate::config::RangeRule { minimum: Some(2.0), maximum: None });
        config.timeliness.date_column = Some("VisitDate".to_string());
        config.timeliness.as_of = chrono::NaiveDate::from_ymd_opt(2024, 2, 1);
        config
    }

    #[test]
    fn test_quality_checks_run_on_table() {
        let summary = QcEngine::new(quality_config()).run_table("t", &visits()).unwrap();
        let metrics = &summary.quality_metrics;

        assert!(metrics.accuracy.enabled);
        assert_eq!(metrics.accuracy.rows.len(), 1);
        assert_eq!(metrics.accuracy.rows[0].row, 0);

        let trace: Vec<(usize, &str)> = metrics.traceability.rows.iter().map(|r| (r.row, r.issue.as_str())).collect();
        assert_eq!(
            trace,
            vec![(0, "duplicate_identifier"), (1, "duplicate_identifier"), (3, "missing_identifier")]
        );

        let timely: Vec<(usize, &str)> = metrics.timeliness.rows.iter().map(|r| (r.row, r.issue.as_str())).collect();
        assert_eq!(timely, vec![(1, "lag_exceeded"), (2, "missing_or_invalid_date")]);
        assert!(metrics.redundancy.enabled);
    }

    #[test]
    fn test_quality_check_selection() {
        let config = quality_config().with_quality_checks(&[QualityCheck::Timeliness]);
        let summary = QcEngine::new(config).run_table("t", &visits()).unwrap();
        let metrics = &summary.quality_metrics;
        assert!(!metrics.accuracy.enabled);
        assert!(!metrics.traceability.enabled);
        assert!(!metrics.redundancy.enabled);
        assert!(metrics.timeliness.enabled);
    }

    #[test]
    fn test_missing_identifier_column_is_recorded() {
        let config = QcConfig::new().with_identifier_columns(["SampleID"]);
        let summary = QcEngine::new(config).run_table("t", &table()).unwrap();
        assert!(!summary.quality_metrics.traceability.enabled);
        assert_eq!(summary.errors[0].kind, "data");
        assert!(summary.errors[0].message.starts_with("traceability: "));
    }

    #[test]
    fn test_mi_uncertainty_without_imputation() {
        let config = QcConfig::new().with_mi_uncertainty(3);
        let summary = QcEngine::new(config).run_table("t", &table()).unwrap();
        let uncertainty = &summary.quality_metrics.imputation_uncertainty;
        assert!(uncertainty.enabled);
        assert_eq!(uncertainty.repeats, 3);
        assert_eq!(uncertainty.seed, Some(42));
        let columns: Vec<&str> = uncertainty.rows.iter().map(|r| r.column.as_str()).collect();
        assert_eq!(columns, vec!["a", "b"]);
        assert!(!summary.imputation.enabled);
    }

    #[test]
    fn test_missing_label_is_warning() {
        let config = QcConfig::new().with_label_column("status");
        let summary = QcEngine::new(config).run_table("t", &table()).unwrap();
        assert!(summary.class_distribution.is_none());
        assert_eq!(summary.warnings[0].stage, "class_distribution");
    }

    #[test]
    fn test_label_column_excluded_and_reported() {
        let t = table()
            .with_column(
                "status",
                vec![Cell::from("x"), Cell::from("y"), Cell::from("x"), Cell::from("x")],
            )
            .unwrap();
        let config = QcConfig::new().with_label_column("status");
        let summary = QcEngine::new(config).run_table("t", &t).unwrap();
        assert_eq!(summary.eligible_columns, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(summary.class_distribution.unwrap().minority_class.as_deref(), Some("y"));
    }
}
