//! Error types for the selectivity estimator.
//!
//! Two families:
//! - [`DatasetError`]: building or loading the in-memory table failed.
//! - [`EstimateError`]: a query was rejected during up-front validation.
//!
//! A zero-probability branch during sampling is never an error; it is an
//! ordinary trial outcome (see [`crate::trial::TrialOutcome::Zero`]).

use std::path::PathBuf;

use thiserror::Error;

/// Failures while constructing or ingesting a [`crate::dataset::Dataset`].
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("IO error reading {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Input has no header row")]
    MissingHeader,

    #[error("Duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("Row {row} has {found} cells, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
}

impl DatasetError {
    /// Create an IO error with the offending path attached.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Validation failures surfaced before any trial runs.
///
/// Any of these aborts the whole estimate; no partial average is returned.
#[derive(Debug, Error)]
pub enum EstimateError {
    #[error("Invalid attribute '{0}': it is not a column of the dataset")]
    InvalidAttribute(String),

    #[error("No query range specified for attribute '{0}'")]
    MissingQueryRange(String),

    #[error("Attribute '{0}' appears more than once in the attribute order")]
    DuplicateAttribute(String),

    #[error("Trial count must be at least 1, got {0}")]
    InvalidTrialCount(usize),

    #[error("Trial count {requested} exceeds the limit of {max}")]
    TrialLimitExceeded { requested: usize, max: usize },

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

impl EstimateError {
    /// Name of the attribute the error refers to, if any.
    pub fn attribute(&self) -> Option<&str> {
        match self {
            Self::InvalidAttribute(a) | Self::MissingQueryRange(a) | Self::DuplicateAttribute(a) => {
                Some(a)
            }
            _ => None,
        }
    }
}

/// Result type alias for estimator operations.
pub type Result<T> = std::result::Result<T, EstimateError>;
