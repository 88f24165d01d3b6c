use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::grading::{GradingPolicy, QuarterWeights, DEFAULT_PASSING_THRESHOLD};
use crate::predictor::{Predictor, DEFAULT_CLASS_AVERAGE};
use crate::record::SectionSet;

#[derive(Parser, Debug, Clone)]
#[command(name = "grade-predictor")]
#[command(
    about = "Predicts missing quarter grades and the final grade for a student",
    long_about = None
)]
pub struct ServerConfig {
    /// Address to bind
    #[arg(long, env = "GRADE_PREDICTOR_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "GRADE_PREDICTOR_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Class-history CSV the reference statistics are built from
    #[arg(long, env = "GRADE_PREDICTOR_REFERENCE_DATA", default_value = "data/class_history.csv")]
    pub reference_data: PathBuf,

    /// Seconds between reference reloads (0 disables)
    #[arg(long, env = "GRADE_PREDICTOR_REFRESH_SECS", default_value_t = 300)]
    pub refresh_secs: u64,

    #[arg(
        long,
        env = "GRADE_PREDICTOR_PASSING_THRESHOLD",
        default_value_t = DEFAULT_PASSING_THRESHOLD
    )]
    pub passing_threshold: f64,

    /// Four quarter weights, normalized to sum to 1
    #[arg(
        long,
        env = "GRADE_PREDICTOR_QUARTER_WEIGHTS",
        value_delimiter = ',',
        default_values_t = [25.0, 25.0, 25.0, 25.0]
    )]
    pub quarter_weights: Vec<f64>,

    /// Accepted class sections
    #[arg(
        long,
        env = "GRADE_PREDICTOR_SECTIONS",
        value_delimiter = ',',
        default_values = ["BANABA", "CABALLERO", "GEMELINA"]
    )]
    pub sections: Vec<String>,

    /// Class average assumed when no history is available
    #[arg(
        long,
        env = "GRADE_PREDICTOR_DEFAULT_CLASS_AVERAGE",
        default_value_t = DEFAULT_CLASS_AVERAGE
    )]
    pub default_class_average: f64,
}

impl ServerConfig {
    pub fn weights(&self) -> Result<QuarterWeights, ConfigError> {
        QuarterWeights::new(&self.quarter_weights)
    }

    pub fn grading_policy(&self) -> Result<GradingPolicy, ConfigError> {
        GradingPolicy::new(self.weights()?, self.passing_threshold)
    }

    pub fn section_set(&self) -> Result<SectionSet, ConfigError> {
        let sections = SectionSet::new(&self.sections);
        if sections.is_empty() {
            return Err(ConfigError::NoSections);
        }
        Ok(sections)
    }

    pub fn predictor(&self) -> Result<Predictor, ConfigError> {
        if !(0.0..=100.0).contains(&self.default_class_average) {
            return Err(ConfigError::OutOfRange {
                name: "default class average",
                value: self.default_class_average,
            });
        }
        Ok(Predictor::new(
            self.section_set()?,
            self.grading_policy()?,
            self.default_class_average,
        ))
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_secs > 0).then(|| Duration::from_secs(self.refresh_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_the_ui_contract() {
        let config = ServerConfig::try_parse_from(["grade-predictor"]).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.passing_threshold, 75.0);
        assert_eq!(config.weights().unwrap(), QuarterWeights::equal());
        assert_eq!(config.section_set().unwrap().iter().count(), 3);
        assert_eq!(config.refresh_interval(), Some(Duration::from_secs(300)));
        assert!(config.predictor().is_ok());
    }

    #[test]
    fn test_policy_flags() {
        let config = ServerConfig::try_parse_from([
            "grade-predictor",
            "--quarter-weights",
            "1,1,1,2",
            "--passing-threshold",
            "60",
            "--sections",
            "narra,molave",
            "--refresh-secs",
            "0",
        ])
        .unwrap();
        assert_eq!(config.grading_policy().unwrap().passing_threshold(), 60.0);
        assert_eq!(config.weights().unwrap().as_array()[3], 0.4);
        assert!(config.section_set().unwrap().resolve("NARRA").is_ok());
        assert_eq!(config.refresh_interval(), None);
    }

    #[test]
    fn test_bad_policy_values_are_rejected() {
        let config =
            ServerConfig::try_parse_from(["grade-predictor", "--quarter-weights", "1,1,1"])
                .unwrap();
        assert_eq!(config.weights(), Err(ConfigError::WeightCount(3)));

        let config =
            ServerConfig::try_parse_from(["grade-predictor", "--default-class-average", "140"])
                .unwrap();
        assert!(matches!(config.predictor(), Err(ConfigError::OutOfRange { .. })));
    }
}
