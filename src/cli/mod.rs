//! phenoqc CLI
//!
//! `phenoqc run` loads one or more files (or directories), applies the
//! configuration plus flag overrides and writes a summary JSON and a
//! metrics TSV per file, plus one batch report for the run.

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use std::path::PathBuf;
use std::time::Instant;

use crate::batch::{collect_files, write_batch_report, BatchRunner, FileReport, FileStatus};
use crate::config::{AccuracySection, CorrelationMethod, ImputationSection, QcConfig, QualityCheck};
use crate::engine::QcEngine;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn muted(s: &str) -> ColoredString { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString    { s.truecolor(100, 210, 120) }
fn warn(s: &str) -> ColoredString  { s.truecolor(230, 190, 90) }
fn fail(s: &str) -> ColoredString  { s.truecolor(230, 100, 100) }

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "phenoqc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Quality control for tabular phenotypic data")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run QC on files or directories
    Run(RunArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn enabled(self) -> bool {
        self == Toggle::On
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MethodArg {
    Pearson,
    Spearman,
}

impl From<MethodArg> for CorrelationMethod {
    fn from(m: MethodArg) -> Self {
        match m {
            MethodArg::Pearson => CorrelationMethod::Pearson,
            MethodArg::Spearman => CorrelationMethod::Spearman,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QualityArg {
    Accuracy,
    Redundancy,
    Traceability,
    Timeliness,
    All,
}

/// Selected checks in first-mention order; `all` selects every check
pub fn quality_checks(args: &[QualityArg]) -> Vec<QualityCheck> {
    if args.contains(&QualityArg::All) {
        return QualityCheck::ALL.to_vec();
    }
    let mut checks = Vec::new();
    for arg in args {
        let check = match arg {
            QualityArg::Accuracy => QualityCheck::Accuracy,
            QualityArg::Redundancy => QualityCheck::Redundancy,
            QualityArg::Traceability => QualityCheck::Traceability,
            QualityArg::Timeliness => QualityCheck::Timeliness,
            QualityArg::All => continue,
        };
        if !checks.contains(&check) {
            checks.push(check);
        }
    }
    checks
}

#[derive(Debug, Clone, clap::Args)]
pub struct RunArgs {
    /// Input files or directories (csv, tsv, json)
    #[arg(short, long, num_args = 1.., required = true)]
    pub input: Vec<PathBuf>,

    /// Output directory for summaries
    #[arg(short, long, default_value = "./reports")]
    pub output: PathBuf,

    /// Configuration file (YAML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Global imputation strategy (mean, median, mode, knn, mice, svd)
    #[arg(long)]
    pub impute: Option<String>,

    /// Strategy parameters as a JSON object
    #[arg(long)]
    pub impute_params: Option<String>,

    /// Enable quick tuning
    #[arg(long, value_enum)]
    pub impute_tuning: Option<Toggle>,

    /// Enable imputation diagnostics
    #[arg(long, value_enum)]
    pub impute_diagnostics: Option<Toggle>,

    /// Diagnostic repeats
    #[arg(long)]
    pub diag_repeats: Option<usize>,

    /// Absolute correlation threshold for redundancy
    #[arg(long)]
    pub redundancy_threshold: Option<f64>,

    /// Correlation method for redundancy
    #[arg(long, value_enum)]
    pub redundancy_method: Option<MethodArg>,

    /// Columns never imputed (comma or space separated)
    #[arg(long, num_args = 1..)]
    pub protected_columns: Vec<String>,

    /// Label column, excluded from imputation
    #[arg(long)]
    pub label_column: Option<String>,

    /// Identifier columns
    #[arg(long, num_args = 1..)]
    pub unique_identifiers: Vec<String>,

    /// Quality checks to run (defaults to all)
    #[arg(long, value_enum, num_args = 1..)]
    pub quality_metrics: Vec<QualityArg>,

    /// JSON schema whose `minimum`/`maximum` bounds drive the accuracy check
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Column that must carry record provenance (traceability)
    #[arg(long)]
    pub source_column: Option<String>,

    /// Date column checked for timeliness
    #[arg(long)]
    pub date_column: Option<String>,

    /// Maximum record age in days
    #[arg(long)]
    pub max_lag_days: Option<i64>,

    /// Minority class share below which imbalance is flagged
    #[arg(long)]
    pub imbalance_threshold: Option<f64>,

    /// Absolute SMD flagging an imputation shift
    #[arg(long)]
    pub bias_smd_threshold: Option<f64>,

    /// Lower variance-ratio bound
    #[arg(long)]
    pub bias_var_low: Option<f64>,

    /// Upper variance-ratio bound
    #[arg(long)]
    pub bias_var_high: Option<f64>,

    /// KS p-value below which a shift is flagged
    #[arg(long)]
    pub bias_ks_alpha: Option<f64>,

    /// Multiple-imputation uncertainty
    #[arg(long, value_enum)]
    pub mi_uncertainty: Option<Toggle>,

    /// MICE repeats for the uncertainty pass
    #[arg(long)]
    pub mi_repeats: Option<usize>,

    /// MICE parameters for the uncertainty pass as a JSON object
    #[arg(long)]
    pub mi_params: Option<String>,

    /// Scan directories recursively
    #[arg(long)]
    pub recursive: bool,

    /// Parallel file workers (defaults to available cores)
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

/// Split comma- and space-separated column lists
pub fn parse_column_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(|c: char| c == ',' || c.is_whitespace()))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn json_object(flag: &str, raw: &str) -> anyhow::Result<serde_json::Map<String, serde_json::Value>> {
    serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("{} must be a JSON object: {}", flag, e))
}

fn imputation_section<'a>(config: &'a mut QcConfig, flag: &str) -> anyhow::Result<&'a mut ImputationSection> {
    config.imputation.as_mut().ok_or_else(|| {
        anyhow::anyhow!("{} requires --impute or an imputation section in the config", flag)
    })
}

/// Config file (or defaults) with CLI flags applied on top
pub fn build_config(args: &RunArgs) -> anyhow::Result<QcConfig> {
    let mut config = match &args.config {
        Some(path) => QcConfig::from_path(path)?,
        None => QcConfig::default(),
    };

    if let Some(strategy) = &args.impute {
        match config.imputation.as_mut() {
            Some(section) => section.strategy = strategy.clone(),
            None => config.imputation = Some(ImputationSection::new(strategy.clone())),
        }
    }
    if let Some(raw) = &args.impute_params {
        let params = json_object("--impute-params", raw)?;
        imputation_section(&mut config, "--impute-params")?.params = params;
    }
    if let Some(toggle) = args.impute_tuning {
        imputation_section(&mut config, "--impute-tuning")?.tuning.enable = toggle.enabled();
    }
    if let Some(toggle) = args.impute_diagnostics {
        config.diagnostics.enable = toggle.enabled();
    }
    if let Some(repeats) = args.diag_repeats {
        config.diagnostics.repeats = repeats;
    }
    if let Some(threshold) = args.redundancy_threshold {
        config.redundancy.threshold = threshold;
    }
    if let Some(method) = args.redundancy_method {
        config.redundancy.method = method.into();
    }
    config
        .protected_columns
        .extend(parse_column_list(&args.protected_columns));
    config
        .identifier_columns
        .extend(parse_column_list(&args.unique_identifiers));
    if let Some(label) = &args.label_column {
        config.label_column = Some(label.clone());
    }

    if !args.quality_metrics.is_empty() {
        config.quality_metrics.checks = quality_checks(&args.quality_metrics);
    }
    if let Some(path) = &args.schema {
        let ranges = AccuracySection::from_schema_path(path)
            .map_err(|e| anyhow::anyhow!("cannot read schema {}: {}", path.display(), e))?
            .ranges;
        config.accuracy.ranges.extend(ranges);
    }
    if let Some(source) = &args.source_column {
        config.traceability.source_column = Some(source.clone());
    }
    if let Some(date_column) = &args.date_column {
        config.timeliness.date_column = Some(date_column.clone());
    }
    if let Some(days) = args.max_lag_days {
        config.timeliness.max_lag_days = days;
    }

    if let Some(threshold) = args.imbalance_threshold {
        config.class_distribution.warn_threshold = threshold;
    }
    let shift = &mut config.quality_metrics.imputation_shift;
    if let Some(v) = args.bias_smd_threshold {
        shift.smd_threshold = v;
    }
    if let Some(v) = args.bias_var_low {
        shift.var_ratio_low = v;
    }
    if let Some(v) = args.bias_var_high {
        shift.var_ratio_high = v;
    }
    if let Some(v) = args.bias_ks_alpha {
        shift.ks_alpha = v;
    }

    if let Some(toggle) = args.mi_uncertainty {
        config.mi_uncertainty.enable = toggle.enabled();
    }
    if let Some(repeats) = args.mi_repeats {
        config.mi_uncertainty.repeats = repeats;
    }
    if let Some(raw) = &args.mi_params {
        config.mi_uncertainty.params = json_object("--mi-params", raw)?;
    }

    config.validate()?;
    Ok(config)
}

fn print_report(report: &FileReport) {
    let (mark, status) = match report.status {
        FileStatus::Processed => (ok("✓"), ok("processed")),
        FileStatus::Invalid => (warn("!"), warn("invalid")),
        FileStatus::Error => (fail("✗"), fail("error")),
    };
    println!("  {} {:<40} {} {}", mark, report.file, status, dim(&format!("{}ms", report.elapsed_ms)));

    if let Some(err) = &report.error {
        println!("      {} {}", muted(&err.kind), err.message);
    }
    if let Some(summary) = &report.summary {
        let metrics = &summary.quality_metrics;
        println!(
            "      {} {}  {} {}  {} {}",
            muted("warnings"),
            summary.warnings.len(),
            muted("redundant pairs"),
            metrics.redundancy.rows.len(),
            muted("shift flags"),
            metrics.imputation_shift.rows.iter().filter(|r| r.warn).count()
        );
        println!(
            "      {} {}  {} {}  {} {}",
            muted("out of range"),
            metrics.accuracy.rows.len(),
            muted("trace issues"),
            metrics.traceability.rows.len(),
            muted("stale or invalid dates"),
            metrics.timeliness.rows.len()
        );
        for marker in &summary.errors {
            println!("      {} {}", warn(&marker.kind), marker.message);
        }
    }
}

// ─── Run ───────────────────────────────────────────────────────────────────────

pub fn cmd_run(args: &RunArgs) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = build_config(args)?;

    let files = collect_files(&args.input, args.recursive);
    if files.is_empty() {
        anyhow::bail!("no supported input files found (csv, tsv, json)");
    }

    let jobs = args.jobs.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });

    section("PhenoQC");
    println!("  {:<12} {}", muted("Files"), files.len());
    println!("  {:<12} {}", muted("Output"), args.output.display());
    println!("  {:<12} {}", muted("Workers"), jobs);
    if let Some(imp) = &config.imputation {
        println!("  {:<12} {}", muted("Imputation"), imp.strategy);
    }
    println!();

    let reports = BatchRunner::new(QcEngine::new(config))
        .with_jobs(jobs)
        .with_output_dir(&args.output)
        .run(&files)?;

    for report in &reports {
        print_report(report);
    }
    let report_path = write_batch_report(&args.output, &reports)?;

    let processed = reports.iter().filter(|r| r.status == FileStatus::Processed).count();
    println!();
    println!(
        "  {} {}/{} files processed {}",
        ok("done"),
        processed,
        reports.len(),
        dim(&format!("({:.2}s)", start.elapsed().as_secs_f64()))
    );
    println!("  {:<12} {}", muted("Report"), report_path.display());
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["phenoqc", "run", "--input", "data.csv"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Run(args) => args,
        }
    }

    #[test]
    fn test_parse_column_list() {
        let raw = vec!["PatientID,Age".to_string(), "Sex  Height".to_string()];
        assert_eq!(parse_column_list(&raw), vec!["PatientID", "Age", "Sex", "Height"]);
    }

    #[test]
    fn test_protected_columns_flag() {
        let a = args(&["--protected-columns", "PatientID,Age", "Sex"]);
        let config = build_config(&a).unwrap();
        assert_eq!(config.protected_columns, vec!["PatientID", "Age", "Sex"]);
    }

    #[test]
    fn test_flag_overrides() {
        let a = args(&[
            "--impute", "knn",
            "--impute-params", r#"{"n_neighbors": 3}"#,
            "--impute-tuning", "on",
            "--impute-diagnostics", "on",
            "--diag-repeats", "7",
            "--redundancy-threshold", "0.9",
            "--redundancy-method", "spearman",
        ]);
        let config = build_config(&a).unwrap();
        let imp = config.imputation.unwrap();
        assert_eq!(imp.strategy, "knn");
        assert_eq!(imp.params["n_neighbors"], 3);
        assert!(imp.tuning.enable);
        assert!(config.diagnostics.enable);
        assert_eq!(config.diagnostics.repeats, 7);
        assert_eq!(config.redundancy.threshold, 0.9);
        assert_eq!(config.redundancy.method, CorrelationMethod::Spearman);
    }

    #[test]
    fn test_params_without_strategy_rejected() {
        let a = args(&["--impute-params", "{}"]);
        assert!(build_config(&a).is_err());
    }

    #[test]
    fn test_quality_metric_selection() {
        let a = args(&["--quality-metrics", "timeliness", "accuracy", "timeliness"]);
        let config = build_config(&a).unwrap();
        assert_eq!(config.quality_metrics.checks, vec![QualityCheck::Timeliness, QualityCheck::Accuracy]);

        let a = args(&["--quality-metrics", "accuracy", "all"]);
        assert_eq!(build_config(&a).unwrap().quality_metrics.checks, QualityCheck::ALL.to_vec());

        let defaults = build_config(&args(&[])).unwrap();
        assert_eq!(defaults.quality_metrics.checks, QualityCheck::ALL.to_vec());
    }

    #[test]
    fn test_threshold_and_uncertainty_flags() {
        let a = args(&[
            "--imbalance-threshold", "0.2",
            "--bias-smd-threshold", "0.25",
            "--bias-var-low", "0.4",
            "--bias-var-high", "2.5",
            "--bias-ks-alpha", "0.01",
            "--mi-uncertainty", "on",
            "--mi-repeats", "3",
            "--mi-params", r#"{"max_iter": 6}"#,
        ]);
        let config = build_config(&a).unwrap();
        assert_eq!(config.class_distribution.warn_threshold, 0.2);
        let shift = &config.quality_metrics.imputation_shift;
        assert_eq!(shift.smd_threshold, 0.25);
        assert_eq!(shift.var_ratio_low, 0.4);
        assert_eq!(shift.var_ratio_high, 2.5);
        assert_eq!(shift.ks_alpha, 0.01);
        assert!(config.mi_uncertainty.enable);
        assert_eq!(config.mi_uncertainty.repeats, 3);
        assert_eq!(config.mi_uncertainty.mice_params().unwrap().max_iter, 6);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        assert!(build_config(&args(&["--imbalance-threshold", "1.5"])).is_err());
        assert!(build_config(&args(&["--bias-var-low", "3.0"])).is_err());
        assert!(build_config(&args(&["--mi-uncertainty", "on", "--mi-repeats", "0"])).is_err());
        assert!(build_config(&args(&["--mi-params", r#"{"rank": 2}"#, "--mi-uncertainty", "on"])).is_err());
    }

    #[test]
    fn test_schema_and_timeliness_flags() {
        let dir = tempfile::tempdir().unwrap();
        let schema = dir.path().join("schema.json");
        std::fs::write(
            &schema,
            r#"{"properties": {"Age": {"type": "number", "minimum": 0, "maximum": 120}}}"#,
        )
        .unwrap();
        let schema_arg = schema.display().to_string();
        let a = args(&[
            "--schema", &schema_arg,
            "--date-column", "VisitDate",
            "--max-lag-days", "90",
            "--source-column", "Site",
        ]);
        let config = build_config(&a).unwrap();
        assert_eq!(config.accuracy.ranges["Age"].maximum, Some(120.0));
        assert_eq!(config.timeliness.date_column.as_deref(), Some("VisitDate"));
        assert_eq!(config.timeliness.max_lag_days, 90);
        assert_eq!(config.traceability.source_column.as_deref(), Some("Site"));
    }
}
