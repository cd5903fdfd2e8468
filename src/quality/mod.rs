//! Dataset quality metrics
//!
//! - Redundant column pairs (identical / correlated)
//! - Value ranges ([`AccuracyChecker`])
//! - Identifier uniqueness and provenance ([`check_traceability`])
//! - Record age ([`TimelinessChecker`])
//! - Class distribution of the label column
//! - Missingness before and after imputation

mod accuracy;
mod class_distribution;
mod missingness;
mod redundancy;
mod timeliness;
mod traceability;

pub use accuracy::{AccuracyChecker, RangeViolation};
pub use class_distribution::{class_distribution, ClassCount, ClassDistribution};
pub use missingness::{ColumnMissing, MissingnessReport};
pub use redundancy::{correlation, RedundancyDetector, RedundancyPair, RelationType};
pub use timeliness::{parse_date, TimelinessChecker, TimelinessIssue, TimelinessRow};
pub use traceability::{check_traceability, TraceIssue, TraceabilityIssue};
