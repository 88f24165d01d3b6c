use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::DataError;
use crate::record::{Gender, Quarter, Section};

// One line of the class-history sheet. Accepts the spreadsheet's long column names too.
#[derive(Debug, Deserialize)]
struct HistoryRow {
    section: String,
    gender: String,
    #[serde(default, alias = "1st_quarter")]
    q1: Option<f64>,
    #[serde(default, alias = "2nd_quarter")]
    q2: Option<f64>,
    #[serde(default, alias = "3rd_quarter")]
    q3: Option<f64>,
    #[serde(default, alias = "4th_quarter")]
    q4: Option<f64>,
    #[serde(default, alias = "final")]
    final_grade: Option<f64>,
}

/// A past student's grades, used to build reference statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub section: Section,
    pub gender: Gender,
    pub quarters: [Option<f64>; 4],
    pub final_grade: Option<f64>,
}

impl HistoryRecord {
    pub fn quarter(&self, quarter: Quarter) -> Option<f64> {
        self.quarters[quarter.index()]
    }

    /// All four quarters, if the record is complete.
    pub fn complete_quarters(&self) -> Option<[f64; 4]> {
        let [q1, q2, q3, q4] = self.quarters;
        Some([q1?, q2?, q3?, q4?])
    }
}

pub fn load_history(path: &Path) -> Result<Vec<HistoryRecord>, DataError> {
    let file = File::open(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_history(file)
}

pub fn parse_history<R: Read>(reader: R) -> Result<Vec<HistoryRecord>, DataError> {
    let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    let mut records = Vec::new();

    for (i, result) in rdr.deserialize::<HistoryRow>().enumerate() {
        // header is line 1
        let row = i + 2;
        let raw = result?;

        if raw.section.is_empty() {
            return Err(DataError::InvalidRow {
                row,
                reason: "section is empty".to_string(),
            });
        }
        let gender = Gender::parse(&raw.gender).map_err(|err| DataError::InvalidRow {
            row,
            reason: err.to_string(),
        })?;

        let quarters = [raw.q1, raw.q2, raw.q3, raw.q4];
        for value in quarters.iter().chain(std::iter::once(&raw.final_grade)).flatten() {
            if !value.is_finite() || !(0.0..=100.0).contains(value) {
                return Err(DataError::InvalidRow {
                    row,
                    reason: format!("grade {} is outside the 0-100 range", value),
                });
            }
        }

        records.push(HistoryRecord {
            section: Section::new(&raw.section),
            gender,
            quarters,
            final_grade: raw.final_grade,
        });
    }

    Ok(records)
}
