//! PhenoQC - Quality control for tabular phenotypic data
//!
//! This crate provides:
//! - Missing-value imputation (mean, median, mode, KNN, MICE, low-rank SVD)
//! - Quick tuning of imputation parameters on masked observed cells
//! - Repeated-mask imputation stability diagnostics
//! - Quality metrics: redundancy, value ranges, traceability, timeliness,
//!   imputation shift and uncertainty, class balance
//! - Batch processing and a command-line interface
//!
//! # Modules
//!
//! ## Core
//! - [`config`] - Configuration loading and strategy resolution
//! - [`data`] - Tables, column roles and the numeric matrix
//! - [`imputation`] - Imputation executors
//!
//! ## Analysis
//! - [`tuning`] - Grid tuning over masked cells
//! - [`diagnostics`] - Stability, distribution shift and MI uncertainty
//! - [`quality`] - Redundancy, accuracy, traceability, timeliness,
//!   missingness, class distribution
//!
//! ## Pipeline
//! - [`engine`] - Single-dataset run
//! - [`summary`] - Result aggregation and export
//! - [`batch`] - Parallel multi-file runs
//! - [`io`] - File loading
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Core
pub mod config;
pub mod data;
pub mod imputation;

// Analysis
pub mod tuning;
pub mod diagnostics;
pub mod quality;

// Pipeline
pub mod engine;
pub mod summary;
pub mod batch;
pub mod io;

// Services
pub mod cli;

pub use error::{PhenoQcError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{ErrorMarker, PhenoQcError, Result};

    // Configuration
    pub use crate::config::{
        ConfigurationResolver, CorrelationMethod, ImputationPlan, ImputationSection, QcConfig,
        QualityCheck, Scoring, StrategyConfig,
    };

    // Data
    pub use crate::data::{Cell, ColumnRole, MatrixBuilder, NumericMatrix, Table};

    // Imputation
    pub use crate::imputation::{apply_plan, Imputer, KnnImputer, MiceImputer, SimpleImputer, SvdImputer};

    // Tuning and diagnostics
    pub use crate::tuning::{ParamGrid, QuickTuner, TuningResult};
    pub use crate::diagnostics::{DiagnosticsResult, DiagnosticsRunner, MiUncertaintyRunner, ShiftAnalyzer};

    // Quality metrics
    pub use crate::quality::{
        check_traceability, class_distribution, AccuracyChecker, MissingnessReport, RedundancyDetector,
        RedundancyPair, TimelinessChecker,
    };

    // Pipeline
    pub use crate::engine::{QcEngine, RunContext};
    pub use crate::summary::{QcSummary, ResultAggregator};
    pub use crate::batch::{write_batch_report, BatchRunner, FileReport, FileStatus};
}
