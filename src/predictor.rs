use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::analytics::{compare, Comparison};
use crate::error::PredictError;
use crate::grading::{GradeStatus, GradingPolicy};
use crate::model::{combined_confidence, ImputationModel};
use crate::record::{GradeRecord, Quarter, RawGradeInput, SectionSet};
use crate::reference::{ReferenceSource, ReferenceStatistics};

/// Global average used when no class history is available at all.
pub const DEFAULT_CLASS_AVERAGE: f64 = 80.0;

/// Orchestrator stages, in order. Used to tag internal failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Imputing,
    Composing,
    Comparing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::Imputing => "imputing",
            Stage::Composing => "composing",
            Stage::Comparing => "comparing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalGrade {
    pub percentage: f64,
    pub status: GradeStatus,
    pub confidence: f64,
}

/// Response body of `POST /predict`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub entered_grades: BTreeMap<Quarter, f64>,
    pub predicted_grades: BTreeMap<Quarter, f64>,
    pub final_grade: FinalGrade,
    pub comparison: Comparison,
    pub current_quarter: u8,
}

impl PredictionResult {
    /// Every quarter appears in exactly one of the entered/predicted maps.
    pub fn covers_each_quarter_once(&self) -> bool {
        Quarter::ALL
            .iter()
            .all(|q| self.entered_grades.contains_key(q) != self.predicted_grades.contains_key(q))
    }
}

/// Single entry point: validate, impute, compose, compare.
#[derive(Debug, Clone)]
pub struct Predictor {
    sections: SectionSet,
    policy: GradingPolicy,
    model: ImputationModel,
    default_stats: ReferenceStatistics,
}

impl Predictor {
    pub fn new(sections: SectionSet, policy: GradingPolicy, default_class_average: f64) -> Self {
        Predictor {
            sections,
            policy,
            model: ImputationModel::new(),
            default_stats: ReferenceStatistics::assumed(default_class_average),
        }
    }

    pub fn policy(&self) -> &GradingPolicy {
        &self.policy
    }

    /// `reference` should be one snapshot for the whole call.
    pub fn predict(
        &self,
        raw: &RawGradeInput,
        reference: &dyn ReferenceSource,
    ) -> Result<PredictionResult, PredictError> {
        let record = GradeRecord::validate(raw, &self.sections)?;
        debug!(
            stage = %Stage::Validating,
            section = %record.section(),
            current_quarter = record.current_quarter().number(),
            known = record.known_count(),
            "grade record accepted"
        );

        let imputations = self
            .model
            .impute(&record, reference, &self.default_stats)
            .map_err(|err| PredictError::internal(Stage::Imputing, err))?;

        let mut values = [f64::NAN; 4];
        let mut entered_grades = BTreeMap::new();
        let mut predicted_grades = BTreeMap::new();
        for (quarter, value) in record.known() {
            values[quarter.index()] = value;
            entered_grades.insert(quarter, value);
        }
        for imputation in &imputations {
            values[imputation.quarter.index()] = imputation.value;
            predicted_grades.insert(imputation.quarter, imputation.value);
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(PredictError::internal(Stage::Composing, "a quarter has no value"));
        }

        let composed = self.policy.compose(&values);
        let confidence = combined_confidence(record.known_count(), &imputations);
        debug!(
            stage = %Stage::Composing,
            percentage = composed.percentage,
            confidence,
            "final grade composed"
        );

        let comparison = compare(
            composed.percentage,
            record.section(),
            reference,
            &self.default_stats,
        );

        let result = PredictionResult {
            entered_grades,
            predicted_grades,
            final_grade: FinalGrade {
                percentage: composed.percentage,
                status: composed.status,
                confidence,
            },
            comparison,
            current_quarter: record.current_quarter().number(),
        };

        if !result.covers_each_quarter_once() {
            return Err(PredictError::internal(
                Stage::Comparing,
                "entered and predicted grades overlap or leave a gap",
            ));
        }
        Ok(result)
    }
}

impl Default for Predictor {
    fn default() -> Self {
        Predictor::new(SectionSet::default(), GradingPolicy::default(), DEFAULT_CLASS_AVERAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::record::RawValue;
    use crate::reference::ReferenceTable;

    fn raw(grades: &[f64], current: f64) -> RawGradeInput {
        let value = |i: usize| grades.get(i).map(|g| RawValue::Number(*g));
        RawGradeInput {
            q1: value(0),
            q2: value(1),
            q3: value(2),
            q4: value(3),
            section: Some("CABALLERO".to_string()),
            gender: Some("MALE".to_string()),
            current_quarter: Some(RawValue::Number(current)),
        }
    }

    #[test]
    fn test_full_year_is_not_predicted() {
        let result = Predictor::default()
            .predict(&raw(&[80.0, 82.0, 78.0, 85.0], 4.0), &ReferenceTable::empty())
            .unwrap();

        assert!(result.predicted_grades.is_empty());
        assert_eq!(result.entered_grades.len(), 4);
        assert_eq!(result.final_grade.percentage, 81.3);
        assert_eq!(result.final_grade.status, GradeStatus::Passed);
        assert_eq!(result.final_grade.confidence, 100.0);
        assert!(result.comparison.estimated);
    }

    #[test]
    fn test_partial_year_fills_the_gap() {
        let result = Predictor::default()
            .predict(&raw(&[60.0, 58.0], 2.0), &ReferenceTable::empty())
            .unwrap();

        let entered: Vec<_> = result.entered_grades.keys().copied().collect();
        let predicted: Vec<_> = result.predicted_grades.keys().copied().collect();
        assert_eq!(entered, vec![Quarter::Q1, Quarter::Q2]);
        assert_eq!(predicted, vec![Quarter::Q3, Quarter::Q4]);
        assert_eq!(result.final_grade.percentage, 57.0);
        assert_eq!(result.final_grade.status, GradeStatus::AtRisk);
        assert_eq!(result.final_grade.confidence, 85.0);
        assert!(result.covers_each_quarter_once());
    }

    #[test]
    fn test_validation_stops_the_pipeline() {
        let err = Predictor::default()
            .predict(&raw(&[80.0], 5.0), &ReferenceTable::empty())
            .unwrap_err();
        assert!(matches!(err, PredictError::Validation(ValidationError::InvalidQuarter(_))));
    }

    #[test]
    fn test_response_field_names() {
        let result = Predictor::default()
            .predict(&raw(&[90.0], 1.0), &ReferenceTable::empty())
            .unwrap();
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["enteredGrades"]["Q1"], 90.0);
        assert!(json["predictedGrades"]["Q4"].is_number());
        assert_eq!(json["finalGrade"]["status"], "PASSED");
        assert!(json["comparison"]["percentile"].is_string());
        assert_eq!(json["currentQuarter"], 1);
    }
}
