use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;
use crate::round_to;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    pub const ALL: [Quarter; 4] = [Quarter::Q1, Quarter::Q2, Quarter::Q3, Quarter::Q4];

    pub fn number(self) -> u8 {
        match self {
            Quarter::Q1 => 1,
            Quarter::Q2 => 2,
            Quarter::Q3 => 3,
            Quarter::Q4 => 4,
        }
    }

    pub fn index(self) -> usize {
        usize::from(self.number() - 1)
    }

    pub fn from_number(n: i64) -> Option<Quarter> {
        match n {
            1 => Some(Quarter::Q1),
            2 => Some(Quarter::Q2),
            3 => Some(Quarter::Q3),
            4 => Some(Quarter::Q4),
            _ => None,
        }
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}", self.number())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn parse(raw: &str) -> Result<Gender, ValidationError> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "MALE" => Ok(Gender::Male),
            "FEMALE" => Ok(Gender::Female),
            _ => Err(ValidationError::UnknownGender(raw.to_string())),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Male => write!(f, "MALE"),
            Gender::Female => write!(f, "FEMALE"),
        }
    }
}

/// Class-section label, normalized to trimmed upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Section(String);

impl Section {
    pub fn new(label: &str) -> Self {
        Section(label.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The closed set of sections a request may name.
#[derive(Debug, Clone)]
pub struct SectionSet {
    sections: Vec<Section>,
}

impl SectionSet {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sections: Vec<Section> = labels
            .into_iter()
            .map(|label| Section::new(label.as_ref()))
            .filter(|section| !section.0.is_empty())
            .collect();
        sections.sort();
        sections.dedup();
        SectionSet { sections }
    }

    pub fn resolve(&self, raw: &str) -> Result<Section, ValidationError> {
        let candidate = Section::new(raw);
        if self.sections.contains(&candidate) {
            Ok(candidate)
        } else {
            Err(ValidationError::UnknownSection(raw.to_string()))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }
}

impl Default for SectionSet {
    fn default() -> Self {
        SectionSet::new(["BANABA", "CABALLERO", "GEMELINA"])
    }
}

/// A form value as the UI sends it: a JSON number or a (possibly empty) string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

/// Body of `POST /predict` before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGradeInput {
    #[serde(default)]
    pub q1: Option<RawValue>,
    #[serde(default)]
    pub q2: Option<RawValue>,
    #[serde(default)]
    pub q3: Option<RawValue>,
    #[serde(default)]
    pub q4: Option<RawValue>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub current_quarter: Option<RawValue>,
}

impl RawGradeInput {
    fn grade(&self, quarter: Quarter) -> Option<&RawValue> {
        match quarter {
            Quarter::Q1 => self.q1.as_ref(),
            Quarter::Q2 => self.q2.as_ref(),
            Quarter::Q3 => self.q3.as_ref(),
            Quarter::Q4 => self.q4.as_ref(),
        }
    }
}

const QUARTER_FIELDS: [&str; 4] = ["q1", "q2", "q3", "q4"];

/// One student's validated grades. Slots up to `current_quarter` are known,
/// the rest are left for the imputation model.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeRecord {
    grades: [Option<f64>; 4],
    current_quarter: Quarter,
    section: Section,
    gender: Gender,
}

impl GradeRecord {
    pub fn validate(
        raw: &RawGradeInput,
        sections: &SectionSet,
    ) -> Result<GradeRecord, ValidationError> {
        let current_quarter = parse_current_quarter(raw.current_quarter.as_ref())?;

        let section = match raw.section.as_deref() {
            Some(label) if !label.trim().is_empty() => sections.resolve(label)?,
            _ => return Err(ValidationError::MissingField("section")),
        };
        let gender = match raw.gender.as_deref() {
            Some(label) if !label.trim().is_empty() => Gender::parse(label)?,
            _ => return Err(ValidationError::MissingField("gender")),
        };

        let mut grades = [None; 4];
        for quarter in Quarter::ALL {
            // Anything entered past the current quarter is ignored; it gets predicted.
            if quarter > current_quarter {
                continue;
            }
            let missing = ValidationError::MissingGrade {
                quarter,
                current: current_quarter.number(),
            };
            let value = parse_grade(quarter, raw.grade(quarter))?.ok_or(missing)?;
            grades[quarter.index()] = Some(value);
        }

        Ok(GradeRecord {
            grades,
            current_quarter,
            section,
            gender,
        })
    }

    pub fn current_quarter(&self) -> Quarter {
        self.current_quarter
    }

    pub fn section(&self) -> &Section {
        &self.section
    }

    pub fn gender(&self) -> Gender {
        self.gender
    }

    pub fn grade(&self, quarter: Quarter) -> Option<f64> {
        self.grades[quarter.index()]
    }

    pub fn known(&self) -> impl Iterator<Item = (Quarter, f64)> + '_ {
        Quarter::ALL
            .into_iter()
            .filter_map(move |quarter| self.grade(quarter).map(|value| (quarter, value)))
    }

    pub fn missing(&self) -> impl Iterator<Item = Quarter> + '_ {
        Quarter::ALL
            .into_iter()
            .filter(move |quarter| self.grade(*quarter).is_none())
    }

    pub fn known_count(&self) -> usize {
        self.grades.iter().filter(|grade| grade.is_some()).count()
    }

    pub fn last_known(&self) -> Option<Quarter> {
        self.known().map(|(quarter, _)| quarter).last()
    }
}

fn parse_current_quarter(raw: Option<&RawValue>) -> Result<Quarter, ValidationError> {
    let raw = raw.ok_or(ValidationError::MissingField("currentQuarter"))?;
    let number = match raw {
        RawValue::Number(n) if n.fract() == 0.0 => Some(*n as i64),
        RawValue::Number(_) => None,
        RawValue::Text(text) if text.trim().is_empty() => {
            return Err(ValidationError::MissingField("currentQuarter"))
        }
        RawValue::Text(text) => text.trim().parse::<i64>().ok(),
    };

    number.and_then(Quarter::from_number).ok_or_else(|| {
        ValidationError::InvalidQuarter(match raw {
            RawValue::Number(n) => n.to_string(),
            RawValue::Text(text) => text.clone(),
        })
    })
}

// Empty strings count as "not entered".
fn parse_grade(quarter: Quarter, raw: Option<&RawValue>) -> Result<Option<f64>, ValidationError> {
    let field = QUARTER_FIELDS[quarter.index()];
    let value = match raw {
        None => return Ok(None),
        Some(RawValue::Number(n)) => *n,
        Some(RawValue::Text(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed.parse::<f64>().map_err(|_| ValidationError::NotANumber {
                field,
                value: text.clone(),
            })?
        }
    };

    if !value.is_finite() {
        return Err(ValidationError::NotANumber {
            field,
            value: value.to_string(),
        });
    }
    if !(0.0..=100.0).contains(&value) {
        return Err(ValidationError::OutOfRange { quarter, value });
    }

    Ok(Some(round_to(value, 2)))
}
