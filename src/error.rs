use std::path::PathBuf;

use thiserror::Error;

use crate::record::Quarter;
use crate::reference::Period;

/// Rejected user input. Always surfaced to the caller as a 4xx.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("grade for {quarter} is required when currentQuarter is {current}")]
    MissingGrade { quarter: Quarter, current: u8 },

    #[error("{field} must be a number (got \"{value}\")")]
    NotANumber { field: &'static str, value: String },

    #[error("{quarter} grade {value} is outside the 0-100 range")]
    OutOfRange { quarter: Quarter, value: f64 },

    #[error("currentQuarter must be 1, 2, 3 or 4 (got {0})")]
    InvalidQuarter(String),

    #[error("unknown section \"{0}\"")]
    UnknownSection(String),

    #[error("unknown gender \"{0}\" (expected MALE or FEMALE)")]
    UnknownGender(String),

    #[error("malformed request: {0}")]
    Malformed(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("no reference statistics for section {section} ({period})")]
pub struct ReferenceDataUnavailable {
    pub section: String,
    pub period: Period,
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("could not shape trend inputs: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("trend fit failed: {0}")]
    Fit(String),

    #[error("imputed value for {quarter} is not finite")]
    NonFinite { quarter: Quarter },
}

/// Everything the orchestrator can return. `Validation` maps to 400, `Internal` to 500.
#[derive(Error, Debug)]
pub enum PredictError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("internal computation error while {stage}: {reason}")]
    Internal {
        stage: crate::predictor::Stage,
        reason: String,
    },
}

impl PredictError {
    pub fn internal(stage: crate::predictor::Stage, reason: impl ToString) -> Self {
        PredictError::Internal {
            stage,
            reason: reason.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum DataError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },

    #[error("reference refresh task failed: {0}")]
    Join(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("expected 4 quarter weights, got {0}")]
    WeightCount(usize),

    #[error("quarter weights must be finite and non-negative with a positive sum")]
    InvalidWeights,

    #[error("{name} must be within 0-100 (got {value})")]
    OutOfRange { name: &'static str, value: f64 },

    #[error("at least one section must be configured")]
    NoSections,
}
