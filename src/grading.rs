use serde::Serialize;

use crate::error::ConfigError;
use crate::round_to;

pub const DEFAULT_PASSING_THRESHOLD: f64 = 75.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GradeStatus {
    Passed,
    AtRisk,
}

/// Per-quarter weights, normalized to sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuarterWeights([f64; 4]);

impl QuarterWeights {
    pub fn equal() -> Self {
        QuarterWeights([0.25; 4])
    }

    pub fn new(raw: &[f64]) -> Result<Self, ConfigError> {
        let raw: [f64; 4] = raw.try_into().map_err(|_| ConfigError::WeightCount(raw.len()))?;
        if raw.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::InvalidWeights);
        }
        let total: f64 = raw.iter().sum();
        if total <= 0.0 {
            return Err(ConfigError::InvalidWeights);
        }
        Ok(QuarterWeights(raw.map(|w| w / total)))
    }

    /// Weighted sum of four quarter values, unrounded.
    pub fn composite(&self, values: &[f64; 4]) -> f64 {
        self.0.iter().zip(values).map(|(w, v)| w * v).sum()
    }

    pub fn as_array(&self) -> [f64; 4] {
        self.0
    }
}

impl Default for QuarterWeights {
    fn default() -> Self {
        QuarterWeights::equal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradingPolicy {
    weights: QuarterWeights,
    passing_threshold: f64,
}

/// The composed final grade before confidence is attached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComposedGrade {
    pub percentage: f64,
    pub status: GradeStatus,
}

impl GradingPolicy {
    pub fn new(weights: QuarterWeights, passing_threshold: f64) -> Result<Self, ConfigError> {
        if !(0.0..=100.0).contains(&passing_threshold) {
            return Err(ConfigError::OutOfRange {
                name: "passing threshold",
                value: passing_threshold,
            });
        }
        Ok(GradingPolicy {
            weights,
            passing_threshold,
        })
    }

    pub fn weights(&self) -> &QuarterWeights {
        &self.weights
    }

    pub fn passing_threshold(&self) -> f64 {
        self.passing_threshold
    }

    /// Final percentage (one decimal) and verdict from the four quarter values.
    pub fn compose(&self, values: &[f64; 4]) -> ComposedGrade {
        let percentage = round_to(self.weights.composite(values), 1).clamp(0.0, 100.0);
        ComposedGrade {
            percentage,
            status: self.status_for(percentage),
        }
    }

    pub fn status_for(&self, percentage: f64) -> GradeStatus {
        if percentage >= self.passing_threshold {
            GradeStatus::Passed
        } else {
            GradeStatus::AtRisk
        }
    }
}

impl Default for GradingPolicy {
    fn default() -> Self {
        GradingPolicy {
            weights: QuarterWeights::equal(),
            passing_threshold: DEFAULT_PASSING_THRESHOLD,
        }
    }
}
