//! Pre-training dataset checks: required columns and missing values.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use diabetes_api::features::FeatureSchema;
use log::debug;
use thiserror::Error;

use crate::dataset::{Dataset, DatasetError};

pub const DEFAULT_DATA_PATH: &str = "data/diabetes.csv";

pub const PASSED_MESSAGE: &str =
    "Data validation passed: all required columns exist and no missing values.";
pub const NULLS_WARNING: &str = "Warning: Missing values detected in dataset";

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Dataset not found at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Missing required columns: {0:?}")]
    MissingColumns(Vec<String>),

    #[error("failed to read dataset: {0}")]
    Read(#[from] std::io::Error),

    #[error(transparent)]
    Malformed(DatasetError),
}

impl From<DatasetError> for ValidationError {
    fn from(err: DatasetError) -> Self {
        match err {
            DatasetError::NotFound { path } => ValidationError::NotFound { path },
            DatasetError::MissingColumns(columns) => ValidationError::MissingColumns(columns),
            DatasetError::Io(e) => ValidationError::Read(e),
            other => ValidationError::Malformed(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Passed,
    NullsPresent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub path: PathBuf,
    pub rows: usize,
    /// Missing cells per required column.
    pub null_counts: BTreeMap<String, usize>,
    pub total_nulls: usize,
    pub outcome: ValidationOutcome,
}

impl ValidationReport {
    pub fn message(&self) -> &'static str {
        match self.outcome {
            ValidationOutcome::Passed => PASSED_MESSAGE,
            ValidationOutcome::NullsPresent => NULLS_WARNING,
        }
    }
}

/// Check the CSV at `path` against the diabetes feature schema.
///
/// Missing values only produce a warning outcome; absent files and absent
/// columns are errors. Nothing is written or repaired.
pub fn validate_dataset(path: &Path) -> Result<ValidationReport, ValidationError> {
    let dataset = Dataset::read_path(path)?;
    let required = FeatureSchema::diabetes().required_columns();

    let missing = dataset.missing_columns(&required);
    if !missing.is_empty() {
        return Err(ValidationError::MissingColumns(missing));
    }

    let null_counts: BTreeMap<String, usize> = required
        .iter()
        .map(|column| (column.clone(), dataset.null_count(column).unwrap_or(0)))
        .collect();
    let total_nulls = null_counts.values().sum();
    debug!("Null counts for {}: {:?}", path.display(), null_counts);

    Ok(ValidationReport {
        path: path.to_path_buf(),
        rows: dataset.n_rows(),
        null_counts,
        total_nulls,
        outcome: if total_nulls == 0 {
            ValidationOutcome::Passed
        } else {
            ValidationOutcome::NullsPresent
        },
    })
}
