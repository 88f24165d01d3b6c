use linfa::prelude::*;
use linfa_linear::LinearRegression;
use ndarray::{Array1, Array2};
use tracing::debug;

use crate::error::ModelError;
use crate::record::{GradeRecord, Quarter};
use crate::reference::{resolve, Period, ReferenceSource, ReferenceStatistics};
use crate::round_to;

/// How fast a single known grade loses weight against the class prior, per quarter of distance.
pub const ANCHOR_DECAY: f64 = 1.0 / 3.0;

// Per-slot confidence = BASE + PER_KNOWN * known - PER_DISTANCE * distance, clamped to 0-100.
pub const SLOT_CONFIDENCE_BASE: f64 = 75.0;
pub const CONFIDENCE_PER_KNOWN_QUARTER: f64 = 5.0;
pub const CONFIDENCE_PER_QUARTER_DISTANCE: f64 = 10.0;

/// Confidence carried by a quarter the user entered.
pub const KNOWN_QUARTER_CONFIDENCE: f64 = 100.0;

/// How missing quarters are extrapolated, chosen by how much is known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExtrapolationStrategy {
    /// Two or more known quarters: least-squares line over (quarter number, grade).
    Trend { slope: f64, intercept: f64 },
    /// One known quarter, blended toward the class average as distance grows.
    Anchored { quarter: Quarter, value: f64 },
    /// Nothing known: the class average.
    Prior,
}

impl ExtrapolationStrategy {
    pub fn for_record(record: &GradeRecord) -> Result<Self, ModelError> {
        let known: Vec<(Quarter, f64)> = record.known().collect();
        match known.as_slice() {
            [] => Ok(ExtrapolationStrategy::Prior),
            [(quarter, value)] => Ok(ExtrapolationStrategy::Anchored {
                quarter: *quarter,
                value: *value,
            }),
            points => fit_trend(points),
        }
    }

    /// Unclamped estimate for `target`; `prior` is the class mean for that quarter.
    fn estimate(&self, target: Quarter, prior: f64) -> f64 {
        match *self {
            ExtrapolationStrategy::Trend { slope, intercept } => {
                intercept + slope * f64::from(target.number())
            }
            ExtrapolationStrategy::Anchored { quarter, value } => {
                let distance = f64::from(target.number().saturating_sub(quarter.number()));
                let weight = 1.0 / (1.0 + distance * ANCHOR_DECAY);
                weight * value + (1.0 - weight) * prior
            }
            ExtrapolationStrategy::Prior => prior,
        }
    }

    fn needs_prior(&self) -> bool {
        !matches!(self, ExtrapolationStrategy::Trend { .. })
    }
}

fn fit_trend(points: &[(Quarter, f64)]) -> Result<ExtrapolationStrategy, ModelError> {
    let x = Array2::from_shape_vec(
        (points.len(), 1),
        points.iter().map(|(quarter, _)| f64::from(quarter.number())).collect(),
    )?;
    let y: Array1<f64> = points.iter().map(|(_, value)| *value).collect();

    let dataset = Dataset::new(x, y);
    let fitted = LinearRegression::new()
        .fit(&dataset)
        .map_err(|err| ModelError::Fit(err.to_string()))?;

    Ok(ExtrapolationStrategy::Trend {
        slope: fitted.params()[0],
        intercept: fitted.intercept(),
    })
}

/// Predicted value and confidence for one missing quarter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Imputation {
    pub quarter: Quarter,
    pub value: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImputationModel;

impl ImputationModel {
    pub fn new() -> Self {
        ImputationModel
    }

    pub fn impute(
        &self,
        record: &GradeRecord,
        reference: &dyn ReferenceSource,
        default: &ReferenceStatistics,
    ) -> Result<Vec<Imputation>, ModelError> {
        let strategy = ExtrapolationStrategy::for_record(record)?;
        let known_count = record.known_count();
        let last_known = record.last_known().map_or(0, Quarter::number);
        debug!(?strategy, known_count, "imputing missing quarters");

        record
            .missing()
            .map(|quarter| {
                let prior = if strategy.needs_prior() {
                    resolve(
                        reference,
                        record.section(),
                        Some(record.gender()),
                        Period::Quarter(quarter),
                        default,
                    )
                    .stats
                    .mean
                } else {
                    0.0
                };

                let raw = strategy.estimate(quarter, prior);
                if !raw.is_finite() {
                    return Err(ModelError::NonFinite { quarter });
                }

                let distance = usize::from(quarter.number().saturating_sub(last_known));
                Ok(Imputation {
                    quarter,
                    value: round_to(raw.clamp(0.0, 100.0), 2),
                    confidence: slot_confidence(known_count, distance),
                })
            })
            .collect()
    }
}

/// Confidence in one predicted quarter: more known quarters and a shorter reach score higher.
pub fn slot_confidence(known_count: usize, distance: usize) -> f64 {
    (SLOT_CONFIDENCE_BASE + CONFIDENCE_PER_KNOWN_QUARTER * known_count as f64
        - CONFIDENCE_PER_QUARTER_DISTANCE * distance as f64)
        .clamp(0.0, 100.0)
}

/// Mean over all four quarters of 100 per known quarter and the slot confidence per predicted one.
pub fn combined_confidence(known_count: usize, imputations: &[Imputation]) -> f64 {
    let total = KNOWN_QUARTER_CONFIDENCE * known_count as f64
        + imputations.iter().map(|imputation| imputation.confidence).sum::<f64>();
    let slots = known_count + imputations.len();
    if slots == 0 {
        return 0.0;
    }
    round_to(total / slots as f64, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RawGradeInput, RawValue, SectionSet};
    use crate::reference::ReferenceTable;

    fn record(grades: &[f64]) -> GradeRecord {
        let value = |i: usize| grades.get(i).map(|g| RawValue::Number(*g));
        let raw = RawGradeInput {
            q1: value(0),
            q2: value(1),
            q3: value(2),
            q4: value(3),
            section: Some("BANABA".to_string()),
            gender: Some("MALE".to_string()),
            current_quarter: Some(RawValue::Number(grades.len() as f64)),
        };
        GradeRecord::validate(&raw, &SectionSet::default()).unwrap()
    }

    #[test]
    fn test_strategy_follows_known_count() {
        assert!(matches!(
            ExtrapolationStrategy::for_record(&record(&[90.0])).unwrap(),
            ExtrapolationStrategy::Anchored { quarter: Quarter::Q1, .. }
        ));
        match ExtrapolationStrategy::for_record(&record(&[60.0, 58.0])).unwrap() {
            ExtrapolationStrategy::Trend { slope, intercept } => {
                assert!((slope + 2.0).abs() < 1e-6);
                assert!((intercept - 62.0).abs() < 1e-6);
            }
            other => panic!("expected trend, got {:?}", other),
        }
    }

    #[test]
    fn test_trend_extrapolates_and_clamps() {
        let empty = ReferenceTable::empty();
        let default = ReferenceStatistics::assumed(80.0);

        let imputations = ImputationModel::new()
            .impute(&record(&[60.0, 58.0]), &empty, &default)
            .unwrap();
        let values: Vec<f64> = imputations.iter().map(|i| i.value).collect();
        assert_eq!(values, vec![56.0, 54.0]);

        let imputations = ImputationModel::new()
            .impute(&record(&[80.0, 90.0, 100.0]), &empty, &default)
            .unwrap();
        assert_eq!(imputations.len(), 1);
        assert_eq!(imputations[0].quarter, Quarter::Q4);
        assert_eq!(imputations[0].value, 100.0);
    }

    #[test]
    fn test_anchored_blend_moves_toward_prior() {
        let empty = ReferenceTable::empty();
        let default = ReferenceStatistics::assumed(70.0);

        let imputations = ImputationModel::new()
            .impute(&record(&[90.0]), &empty, &default)
            .unwrap();
        let values: Vec<f64> = imputations.iter().map(|i| i.value).collect();
        // weights 3/4, 3/5, 1/2 toward the known grade
        assert_eq!(values, vec![85.0, 82.0, 80.0]);
    }

    #[test]
    fn test_prior_strategy_uses_reference_mean() {
        let strategy = ExtrapolationStrategy::Prior;
        assert_eq!(strategy.estimate(Quarter::Q3, 77.5), 77.5);
    }

    #[test]
    fn test_confidence_schedule() {
        assert_eq!(slot_confidence(3, 1), 80.0);
        assert_eq!(slot_confidence(2, 1), 75.0);
        assert_eq!(slot_confidence(2, 2), 65.0);
        assert_eq!(slot_confidence(1, 3), 50.0);
        assert_eq!(slot_confidence(0, 4), 35.0);
        assert_eq!(slot_confidence(0, 9), 0.0);
    }

    #[test]
    fn test_combined_confidence_by_current_quarter() {
        let empty = ReferenceTable::empty();
        let default = ReferenceStatistics::assumed(80.0);
        let model = ImputationModel::new();

        for (grades, expected) in [
            (vec![90.0], 70.0),
            (vec![90.0, 85.0], 85.0),
            (vec![90.0, 85.0, 88.0], 95.0),
            (vec![90.0, 85.0, 88.0, 92.0], 100.0),
        ] {
            let rec = record(&grades);
            let imputations = model.impute(&rec, &empty, &default).unwrap();
            assert_eq!(combined_confidence(rec.known_count(), &imputations), expected);
        }
    }
}
