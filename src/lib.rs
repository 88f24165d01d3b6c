//! Quarterly grade prediction: fills in the quarters a student hasn't reached yet,
//! composes a final grade and compares it with the class history.

pub mod analytics;
pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod grading;
pub mod model;
pub mod predictor;
pub mod record;
pub mod reference;

pub use error::{PredictError, ValidationError};
pub use predictor::{PredictionResult, Predictor};
pub use record::RawGradeInput;
pub use reference::{ReferenceSource, ReferenceStore, ReferenceTable};

/// Rounds half away from zero to `decimals` places.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(81.25, 1), 81.3);
        assert_eq!(round_to(-14.04, 1), -14.0);
        assert_eq!(round_to(88.456, 2), 88.46);
    }
}
