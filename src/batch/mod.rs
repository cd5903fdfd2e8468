//! Batch runs over many input files
//!
//! Files are processed in parallel on a dedicated rayon pool. Every file
//! gets its own engine run and its own [`FileReport`]; a failure in one
//! file never affects the others. A failed file still gets a summary JSON
//! carrying its error marker.

use crate::engine::QcEngine;
use crate::error::{ErrorMarker, PhenoQcError, Result};
use crate::io::SUPPORTED_EXTENSIONS;
use crate::summary::QcSummary;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

pub use crate::summary::FileStatus;

/// Name of the run-level report written next to the per-file outputs
pub const BATCH_REPORT_FILE: &str = "batch_report.json";

/// Per-file batch result
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: String,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorMarker>,
    /// Full summary; written to its own file, not repeated in the batch report
    #[serde(skip_serializing)]
    pub summary: Option<QcSummary>,
    /// Files written for this input
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Run-level report over all files
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport<'a> {
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub processed: usize,
    pub invalid: usize,
    pub error: usize,
    pub files: &'a [FileReport],
}

impl<'a> BatchReport<'a> {
    pub fn new(files: &'a [FileReport]) -> Self {
        let count = |status: FileStatus| files.iter().filter(|r| r.status == status).count();
        Self {
            generated_at: Utc::now(),
            total: files.len(),
            processed: count(FileStatus::Processed),
            invalid: count(FileStatus::Invalid),
            error: count(FileStatus::Error),
            files,
        }
    }
}

/// Write [`BATCH_REPORT_FILE`] into `output_dir`
pub fn write_batch_report(output_dir: &Path, reports: &[FileReport]) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(BATCH_REPORT_FILE);
    fs::write(&path, serde_json::to_string_pretty(&BatchReport::new(reports))?)?;
    info!(path = %path.display(), files = reports.len(), "Wrote batch report");
    Ok(path)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn scan_dir(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(path = %dir.display(), error = %err, "Cannot read directory, skipping");
            return;
        }
    };
    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "Cannot read directory entry, skipping");
                continue;
            }
        };
        if path.is_dir() {
            if recursive {
                scan_dir(&path, recursive, out);
            }
        } else if is_supported(&path) {
            out.push(path);
        }
    }
}

/// Supported files among `inputs`; directories are scanned (recursively
/// when asked). Sorted and deduplicated.
pub fn collect_files<P: AsRef<Path>>(inputs: &[P], recursive: bool) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        let path = input.as_ref();
        if path.is_dir() {
            scan_dir(path, recursive, &mut files);
        } else if path.is_file() {
            if is_supported(path) {
                files.push(path.to_path_buf());
            } else {
                warn!(path = %path.display(), "Unsupported file type, skipping");
            }
        } else {
            warn!(path = %path.display(), "Input path does not exist, skipping");
        }
    }
    files.sort();
    files.dedup();
    files
}

fn file_stem(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string())
}

/// Output stems in input order. Repeated stems get `_2`, `_3`, ...
pub fn output_stems(files: &[PathBuf]) -> Vec<String> {
    let mut used = HashSet::with_capacity(files.len());
    files
        .iter()
        .map(|file| {
            let stem = file_stem(file);
            let mut candidate = stem.clone();
            let mut k = 2;
            while used.contains(&candidate) {
                candidate = format!("{}_{}", stem, k);
                k += 1;
            }
            used.insert(candidate.clone());
            candidate
        })
        .collect()
}

/// Summary JSON and metrics TSV paths for one output stem
pub fn output_paths(output_dir: &Path, stem: &str) -> (PathBuf, PathBuf) {
    (
        output_dir.join(format!("{}_qc_summary.json", stem)),
        output_dir.join(format!("{}_quality_metrics.tsv", stem)),
    )
}

/// Parallel per-file runner
#[derive(Debug, Clone)]
pub struct BatchRunner {
    engine: QcEngine,
    jobs: usize,
    output_dir: Option<PathBuf>,
}

impl BatchRunner {
    pub fn new(engine: QcEngine) -> Self {
        Self {
            engine,
            jobs: 1,
            output_dir: None,
        }
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Write summary JSON and metrics TSV for each processed file
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Reports in input order
    pub fn run(&self, files: &[PathBuf]) -> Result<Vec<FileReport>> {
        if let Some(dir) = &self.output_dir {
            fs::create_dir_all(dir)?;
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .map_err(|e| PhenoQcError::ConfigError(format!("cannot build worker pool: {}", e)))?;

        info!(files = files.len(), jobs = self.jobs, "Starting batch");
        let stems = output_stems(files);
        let reports: Vec<FileReport> = pool.install(|| {
            files
                .par_iter()
                .zip(stems.par_iter())
                .map(|(file, stem)| self.process(file, stem))
                .collect()
        });

        let processed = reports.iter().filter(|r| r.status == FileStatus::Processed).count();
        info!(processed, total = reports.len(), "Batch finished");
        Ok(reports)
    }

    fn process(&self, file: &Path, stem: &str) -> FileReport {
        let started_at = Utc::now();
        let timer = Instant::now();

        let (status, error, summary, outputs) = match self.engine.run_path(file) {
            Ok(summary) => match self.write_outputs(stem, &summary) {
                Ok(outputs) => (FileStatus::Processed, None, Some(summary), outputs),
                Err(err) => (FileStatus::Error, Some(err.to_marker()), Some(summary), Vec::new()),
            },
            Err(err) => {
                let status = match &err {
                    PhenoQcError::ConfigError(_)
                    | PhenoQcError::InvalidParameter { .. }
                    | PhenoQcError::DataError(_)
                    | PhenoQcError::ColumnNotFound(_)
                    | PhenoQcError::ShapeError { .. } => FileStatus::Invalid,
                    _ => FileStatus::Error,
                };
                warn!(file = %file.display(), error = %err, "File failed");
                let marker = err.to_marker();
                let outputs = self.write_failure(file, stem, status, &marker);
                (status, Some(marker), None, outputs)
            }
        };

        FileReport {
            file: file.display().to_string(),
            status,
            error,
            summary,
            outputs,
            started_at,
            elapsed_ms: timer.elapsed().as_millis() as u64,
        }
    }

    fn write_outputs(&self, stem: &str, summary: &QcSummary) -> Result<Vec<String>> {
        let Some(dir) = &self.output_dir else {
            return Ok(Vec::new());
        };
        let (json_path, tsv_path) = output_paths(dir, stem);
        summary.write_json(&json_path)?;
        summary.write_tsv(&tsv_path)?;
        Ok(vec![json_path.display().to_string(), tsv_path.display().to_string()])
    }

    /// Summary JSON holding only the error marker; a write failure is
    /// logged and leaves the report without outputs
    fn write_failure(&self, file: &Path, stem: &str, status: FileStatus, marker: &ErrorMarker) -> Vec<String> {
        let Some(dir) = &self.output_dir else {
            return Vec::new();
        };
        let (json_path, _) = output_paths(dir, stem);
        let dataset = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());
        match QcSummary::failed(dataset, status, marker.clone()).write_json(&json_path) {
            Ok(()) => vec![json_path.display().to_string()],
            Err(err) => {
                warn!(path = %json_path.display(), error = %err, "Cannot write failure summary");
                Vec::new()
            }
        }
    }
}
