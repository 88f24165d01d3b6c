use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::data::{load_history, HistoryRecord};
use crate::error::{DataError, ReferenceDataUnavailable};
use crate::grading::QuarterWeights;
use crate::record::{Gender, Quarter, Section};

/// Spread around the default mean used when no quartiles are known.
const ASSUMED_QUARTILE_SPREAD: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Quarter(Quarter),
    Final,
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Quarter(quarter) => write!(f, "{}", quarter),
            Period::Final => write!(f, "final"),
        }
    }
}

/// Summary of a historical grade distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceStatistics {
    pub count: usize,
    pub mean: f64,
    pub lower_quartile: f64,
    pub upper_quartile: f64,
}

impl ReferenceStatistics {
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        Some(ReferenceStatistics {
            count: sorted.len(),
            mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
            lower_quartile: quantile(&sorted, 0.25),
            upper_quartile: quantile(&sorted, 0.75),
        })
    }

    /// Stand-in distribution around a configured average, with no samples behind it.
    pub fn assumed(mean: f64) -> Self {
        ReferenceStatistics {
            count: 0,
            mean,
            lower_quartile: (mean - ASSUMED_QUARTILE_SPREAD).max(0.0),
            upper_quartile: (mean + ASSUMED_QUARTILE_SPREAD).min(100.0),
        }
    }
}

// Linear interpolation between closest ranks; `sorted` must be non-empty.
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let position = p * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Read-only access to historical class statistics.
pub trait ReferenceSource: Send + Sync {
    /// Statistics for a section, narrowed to a gender when given and available.
    fn lookup(
        &self,
        section: &Section,
        gender: Option<Gender>,
        period: Period,
    ) -> Result<ReferenceStatistics, ReferenceDataUnavailable>;

    /// Statistics across every section, used as an estimate when a section has none.
    fn pooled(&self, _period: Period) -> Option<ReferenceStatistics> {
        None
    }
}

/// Statistics picked for a computation, and whether they were a stand-in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved {
    pub stats: ReferenceStatistics,
    pub estimated: bool,
}

/// Lookup with fallbacks: section data, then pooled data, then the configured default.
pub fn resolve(
    source: &dyn ReferenceSource,
    section: &Section,
    gender: Option<Gender>,
    period: Period,
    default: &ReferenceStatistics,
) -> Resolved {
    match source.lookup(section, gender, period) {
        Ok(stats) => Resolved {
            stats,
            estimated: false,
        },
        Err(unavailable) => {
            let stats = match source.pooled(period) {
                Some(pooled) => {
                    debug!(%unavailable, "using pooled statistics");
                    pooled
                }
                None => {
                    debug!(%unavailable, mean = default.mean, "using default statistics");
                    *default
                }
            };
            Resolved {
                stats,
                estimated: true,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StatsKey {
    section: Section,
    gender: Option<Gender>,
    period: Period,
}

/// Immutable statistics snapshot built from class history.
#[derive(Debug, Default)]
pub struct ReferenceTable {
    groups: HashMap<StatsKey, ReferenceStatistics>,
    pooled: HashMap<Period, ReferenceStatistics>,
    records: usize,
}

impl ReferenceTable {
    pub fn empty() -> Self {
        ReferenceTable::default()
    }

    pub fn from_history(history: &[HistoryRecord], weights: &QuarterWeights) -> Self {
        let mut grouped: HashMap<StatsKey, Vec<f64>> = HashMap::new();
        let mut pooled: HashMap<Period, Vec<f64>> = HashMap::new();

        for record in history {
            let mut samples: Vec<(Period, f64)> = Quarter::ALL
                .into_iter()
                .filter_map(|quarter| {
                    record
                        .quarter(quarter)
                        .map(|value| (Period::Quarter(quarter), value))
                })
                .collect();

            let final_grade = record.final_grade.or_else(|| {
                record
                    .complete_quarters()
                    .map(|quarters| weights.composite(&quarters))
            });
            if let Some(final_grade) = final_grade {
                samples.push((Period::Final, final_grade));
            }

            for (period, value) in samples {
                for gender in [Some(record.gender), None] {
                    grouped
                        .entry(StatsKey {
                            section: record.section.clone(),
                            gender,
                            period,
                        })
                        .or_default()
                        .push(value);
                }
                pooled.entry(period).or_default().push(value);
            }
        }

        ReferenceTable {
            groups: grouped
                .into_iter()
                .filter_map(|(key, samples)| {
                    ReferenceStatistics::from_samples(&samples).map(|stats| (key, stats))
                })
                .collect(),
            pooled: pooled
                .into_iter()
                .filter_map(|(period, samples)| {
                    ReferenceStatistics::from_samples(&samples).map(|stats| (period, stats))
                })
                .collect(),
            records: history.len(),
        }
    }

    pub fn load(path: &Path, weights: &QuarterWeights) -> Result<Self, DataError> {
        let history = load_history(path)?;
        Ok(ReferenceTable::from_history(&history, weights))
    }

    /// Number of history rows the table was built from.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Number of (section, gender, period) groups with statistics.
    pub fn groups(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl ReferenceSource for ReferenceTable {
    fn lookup(
        &self,
        section: &Section,
        gender: Option<Gender>,
        period: Period,
    ) -> Result<ReferenceStatistics, ReferenceDataUnavailable> {
        let narrowed = gender.and_then(|gender| {
            self.groups.get(&StatsKey {
                section: section.clone(),
                gender: Some(gender),
                period,
            })
        });
        narrowed
            .or_else(|| {
                self.groups.get(&StatsKey {
                    section: section.clone(),
                    gender: None,
                    period,
                })
            })
            .copied()
            .ok_or_else(|| ReferenceDataUnavailable {
                section: section.to_string(),
                period,
            })
    }

    fn pooled(&self, period: Period) -> Option<ReferenceStatistics> {
        self.pooled.get(&period).copied()
    }
}

/// Holds the current reference snapshot. Readers clone the `Arc` once per request,
/// so a reload never changes statistics under a running computation.
pub struct ReferenceStore {
    current: RwLock<Arc<ReferenceTable>>,
    path: PathBuf,
    weights: QuarterWeights,
}

impl ReferenceStore {
    pub fn new(table: ReferenceTable, path: PathBuf, weights: QuarterWeights) -> Self {
        ReferenceStore {
            current: RwLock::new(Arc::new(table)),
            path,
            weights,
        }
    }

    /// Loads `path`, starting empty (every comparison estimated) if it can't be read.
    pub fn open(path: PathBuf, weights: QuarterWeights) -> Self {
        let table = match ReferenceTable::load(&path, &weights) {
            Ok(table) => {
                info!(
                    path = %path.display(),
                    records = table.records(),
                    groups = table.groups(),
                    "reference statistics loaded"
                );
                table
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "reference statistics unavailable, using estimates"
                );
                ReferenceTable::empty()
            }
        };
        ReferenceStore::new(table, path, weights)
    }

    pub fn snapshot(&self) -> Arc<ReferenceTable> {
        let guard = self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    pub fn replace(&self, table: ReferenceTable) {
        let mut guard = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(table);
    }

    /// Re-reads the history file. On failure the previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<(), DataError> {
        let path = self.path.clone();
        let weights = self.weights;
        let table = tokio::task::spawn_blocking(move || ReferenceTable::load(&path, &weights))
            .await
            .map_err(|err| DataError::Join(err.to_string()))??;

        debug!(
            records = table.records(),
            groups = table.groups(),
            "reference statistics refreshed"
        );
        self.replace(table);
        Ok(())
    }
}

pub fn spawn_refresh(store: Arc<ReferenceStore>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // first tick fires immediately and the table was just loaded
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(err) = store.refresh().await {
                warn!(
                    path = %store.path.display(),
                    error = %err,
                    "reference refresh failed, keeping previous snapshot"
                );
            }
        }
    })
}
