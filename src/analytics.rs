use serde::Serialize;
use tracing::debug;

use crate::record::Section;
use crate::reference::{resolve, Period, ReferenceSource, ReferenceStatistics};
use crate::round_to;

/// Where a final grade sits in the class distribution.
///
/// With class mean `m` and quartiles `p25`/`p75`:
/// - top quartile: `grade >= max(p75, m)`
/// - above average: `m <= grade`
/// - below average: `min(p25, m) <= grade`
/// - needs support: everything lower
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PercentileBand {
    TopQuartile,
    AboveAverage,
    BelowAverage,
    NeedsSupport,
}

impl PercentileBand {
    pub fn classify(percentage: f64, stats: &ReferenceStatistics) -> Self {
        if percentage >= stats.upper_quartile.max(stats.mean) {
            PercentileBand::TopQuartile
        } else if percentage >= stats.mean {
            PercentileBand::AboveAverage
        } else if percentage >= stats.lower_quartile.min(stats.mean) {
            PercentileBand::BelowAverage
        } else {
            PercentileBand::NeedsSupport
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PercentileBand::TopQuartile => "top quartile",
            PercentileBand::AboveAverage => "above average",
            PercentileBand::BelowAverage => "below average",
            PercentileBand::NeedsSupport => "needs support",
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub class_average: f64,
    pub difference: f64,
    pub percentile: String,
    // only present when the class statistics were a stand-in
    #[serde(skip_serializing_if = "is_false")]
    pub estimated: bool,
}

/// Benchmarks a final percentage against the section's historical final grades.
pub fn compare(
    percentage: f64,
    section: &Section,
    reference: &dyn ReferenceSource,
    default: &ReferenceStatistics,
) -> Comparison {
    let resolved = resolve(reference, section, None, Period::Final, default);
    let class_average = round_to(resolved.stats.mean, 1);
    // classify against the average the response reports
    let reported = ReferenceStatistics {
        mean: class_average,
        ..resolved.stats
    };
    let band = PercentileBand::classify(percentage, &reported);
    debug!(
        %section,
        class_average,
        band = band.label(),
        estimated = resolved.estimated,
        "compared final grade"
    );

    Comparison {
        class_average,
        difference: round_to(percentage - class_average, 1),
        percentile: band.label().to_string(),
        estimated: resolved.estimated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parse_history;
    use crate::grading::QuarterWeights;
    use crate::reference::ReferenceTable;

    fn stats(mean: f64, lower: f64, upper: f64) -> ReferenceStatistics {
        ReferenceStatistics {
            count: 10,
            mean,
            lower_quartile: lower,
            upper_quartile: upper,
        }
    }

    #[test]
    fn test_bands_partition_the_distribution() {
        let s = stats(80.0, 75.0, 86.0);
        assert_eq!(PercentileBand::classify(90.0, &s), PercentileBand::TopQuartile);
        assert_eq!(PercentileBand::classify(86.0, &s), PercentileBand::TopQuartile);
        assert_eq!(PercentileBand::classify(80.0, &s), PercentileBand::AboveAverage);
        assert_eq!(PercentileBand::classify(79.9, &s), PercentileBand::BelowAverage);
        assert_eq!(PercentileBand::classify(75.0, &s), PercentileBand::BelowAverage);
        assert_eq!(PercentileBand::classify(60.0, &s), PercentileBand::NeedsSupport);
    }

    #[test]
    fn test_band_agrees_with_sign_on_skewed_data() {
        // upper quartile below the mean
        let s = stats(80.0, 70.0, 78.0);
        assert_eq!(PercentileBand::classify(79.0, &s), PercentileBand::BelowAverage);
        assert_eq!(PercentileBand::classify(80.0, &s), PercentileBand::TopQuartile);
    }

    #[test]
    fn test_difference_is_rounded_and_signed() {
        let csv = "section,gender,q1,q2,q3,q4,final_grade\n\
                   BANABA,MALE,,,,,70.04\n\
                   BANABA,FEMALE,,,,,72.0\n";
        let history = parse_history(csv.as_bytes()).unwrap();
        let table = ReferenceTable::from_history(&history, &QuarterWeights::equal());
        let default = ReferenceStatistics::assumed(80.0);

        let comparison = compare(57.0, &Section::new("BANABA"), &table, &default);
        assert_eq!(comparison.class_average, 71.0);
        assert_eq!(comparison.difference, -14.0);
        assert_eq!(comparison.percentile, "needs support");
        assert!(!comparison.estimated);
    }

    #[test]
    fn test_grade_equal_to_rounded_average_is_not_below_it() {
        let csv = "section,gender,q1,q2,q3,q4,final_grade\n\
                   BANABA,MALE,,,,,80.0\n\
                   BANABA,FEMALE,,,,,80.08\n";
        let history = parse_history(csv.as_bytes()).unwrap();
        let table = ReferenceTable::from_history(&history, &QuarterWeights::equal());
        let default = ReferenceStatistics::assumed(80.0);

        let comparison = compare(80.0, &Section::new("BANABA"), &table, &default);
        assert_eq!(comparison.class_average, 80.0);
        assert_eq!(comparison.difference, 0.0);
        assert_eq!(comparison.percentile, "above average");

        let below = compare(79.9, &Section::new("BANABA"), &table, &default);
        assert!(below.difference < 0.0);
        assert_eq!(below.percentile, "needs support");
    }

    #[test]
    fn test_missing_statistics_fall_back_and_are_flagged() {
        let default = ReferenceStatistics::assumed(80.0);
        let comparison = compare(81.3, &Section::new("BANABA"), &ReferenceTable::empty(), &default);
        assert_eq!(comparison.class_average, 80.0);
        assert_eq!(comparison.difference, 1.3);
        assert_eq!(comparison.percentile, "above average");
        assert!(comparison.estimated);

        let json = serde_json::to_value(&comparison).unwrap();
        assert_eq!(json["estimated"], true);
        assert_eq!(json["classAverage"], 80.0);
    }

    #[test]
    fn test_estimated_flag_is_omitted_when_false() {
        let comparison = Comparison {
            class_average: 80.0,
            difference: 0.0,
            percentile: "above average".to_string(),
            estimated: false,
        };
        let json = serde_json::to_value(&comparison).unwrap();
        assert!(json.get("estimated").is_none());
    }
}
