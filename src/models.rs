//! Data models for the demographic pipeline.
//!
//! This module contains the core data structures used throughout the
//! application: raw and normalized records, the typed aggregate keys,
//! and the partial/final aggregate value types.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tdigest::TDigest;

/// Number of centroids kept by each quantile digest.
///
/// 100 centroids keep the median within a fraction of a percent for large
/// groups and reproduce it exactly whenever a group has fewer distinct
/// ages than centroids.
pub const DIGEST_CENTROIDS: usize = 100;

/// Date formats accepted for the birth-date column, tried in order.
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y"];

/// Parse a birth-date string leniently.
///
/// Unparseable or empty input yields `None`, never an error: malformed
/// dates are a recoverable data condition and only exclude the record
/// from age-based aggregates.
pub fn parse_birth_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

/// One row of the source file, extracted by column position.
///
/// Fields are kept verbatim; all derivation happens in [`Record::from_raw`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// Origin postal code.
    pub origin: String,
    /// Destination postal code.
    pub destination: String,
    /// Birth date as it appeared in the file (possibly empty or garbage).
    pub birth_date: String,
    /// Species label.
    pub species: String,
    /// Gender label.
    pub gender: String,
}

/// A normalized record with its derived demographic fields.
#[derive(Debug, Clone)]
pub struct Record {
    /// Origin postal code.
    pub origin: String,
    /// Destination postal code.
    pub destination: String,
    /// Parsed birth date, `None` when missing or malformed.
    pub birth_date: Option<NaiveDate>,
    /// Species label.
    pub species: String,
    /// Gender label.
    pub gender: String,
    /// Social stratum: first character of the origin postal code.
    pub stratum: Option<char>,
    /// Age in years relative to the reference year, `None` without a birth date.
    pub age: Option<i32>,
}

impl Record {
    /// Normalize a raw row against a reference year.
    ///
    /// Age is `reference_year - birth_year`; both it and the stratum are
    /// pure functions of the raw fields.
    pub fn from_raw(raw: RawRow, reference_year: i32) -> Self {
        let birth_date = parse_birth_date(&raw.birth_date);
        let age = birth_date.map(|date| reference_year - date.year());
        let stratum = raw.origin.chars().next();

        Self {
            origin: raw.origin,
            destination: raw.destination,
            birth_date,
            species: raw.species,
            gender: raw.gender,
            stratum,
            age,
        }
    }
}

/// Coarse age bracket.
///
/// Boundaries are the reporting convention of the source data: 18, 36 and
/// 61. They are distinct from the dependency-ratio boundaries (15/64) and
/// the two sets must not be unified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeBracket {
    /// Under 18.
    Child,
    /// 18 through 35.
    YoungAdult,
    /// 36 through 60.
    Adult,
    /// Over 60.
    Senior,
}

impl AgeBracket {
    /// Classify a known age. Records without an age carry no bracket.
    pub fn from_age(age: i32) -> Self {
        if age < 18 {
            AgeBracket::Child
        } else if age <= 35 {
            AgeBracket::YoungAdult
        } else if age <= 60 {
            AgeBracket::Adult
        } else {
            AgeBracket::Senior
        }
    }

    /// The bracket's reporting label.
    pub fn label(&self) -> &'static str {
        match self {
            AgeBracket::Child => "0-17",
            AgeBracket::YoungAdult => "18-35",
            AgeBracket::Adult => "36-60",
            AgeBracket::Senior => "61+",
        }
    }
}

impl fmt::Display for AgeBracket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Five-year age group, capped at "90+".
///
/// The inner value is the lower bound of the bucket (0, 5, ..., 90), so
/// the derived ordering sorts "90+" last without string tricks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuinquennialGroup(u8);

impl QuinquennialGroup {
    /// Classify a known age.
    ///
    /// Negative ages are invalid data and carry no group; the record is
    /// excluded from the pyramid only.
    pub fn from_age(age: i32) -> Option<Self> {
        if age < 0 {
            return None;
        }
        if age >= 90 {
            Some(Self(90))
        } else {
            Some(Self((age / 5 * 5) as u8))
        }
    }

    /// The group's reporting label, e.g. "20-24" or "90+".
    pub fn label(&self) -> String {
        if self.0 >= 90 {
            "90+".to_string()
        } else {
            format!("{}-{}", self.0, self.0 + 4)
        }
    }
}

impl fmt::Display for QuinquennialGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Key for per-(species, gender) age statistics.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub species: String,
    pub gender: String,
}

/// Key for (species, gender, bracket) population counts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BracketKey {
    pub species: String,
    pub gender: String,
    pub bracket: AgeBracket,
}

/// Key for (origin, destination) travel-flow counts.
///
/// The derived ordering (origin, then destination) doubles as the
/// deterministic tie-break when flows share a count.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowKey {
    pub origin: String,
    pub destination: String,
}

/// Key for (five-year group, gender) pyramid counts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PyramidKey {
    pub group: QuinquennialGroup,
    pub gender: String,
}

/// Sufficient statistics for one (species, gender) group's ages.
///
/// Count and sum reconstruct the mean exactly under any merge order; the
/// digest is the mergeable estimator backing the median.
#[derive(Debug, Clone)]
pub struct AgeStats {
    /// Number of records with a known age.
    pub count: u64,
    /// Sum of those ages.
    pub sum: i64,
    /// Quantile digest seeded with the same ages.
    pub digest: TDigest,
}

impl AgeStats {
    /// Build the statistics from one chunk's ages for a group.
    pub fn from_ages(ages: Vec<f64>) -> Self {
        let count = ages.len() as u64;
        let sum = ages.iter().map(|age| *age as i64).sum();
        let digest = TDigest::new_with_size(DIGEST_CENTROIDS).merge_unsorted(ages);
        Self { count, sum, digest }
    }

    /// Fold another group's statistics into this one.
    pub fn merge(&mut self, other: AgeStats) {
        self.count += other.count;
        self.sum += other.sum;
        let digest = std::mem::take(&mut self.digest);
        self.digest = TDigest::merge_digests(vec![digest, other.digest]);
    }

    /// Mean age, `None` for an empty group.
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum as f64 / self.count as f64)
        }
    }

    /// Median age from the digest, `None` for an empty group.
    pub fn median(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.digest.estimate_quantile(0.5))
        }
    }
}

/// Dependency-ratio tallies.
///
/// Dependents are records aged under 15 or over 64; working age is 15
/// through 64 inclusive. Division is deferred to the combiner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyCounts {
    /// Records aged under 15 or over 64.
    pub dependents: u64,
    /// Records aged 15 through 64.
    pub working_age: u64,
}

impl DependencyCounts {
    /// Tally one known age.
    pub fn observe(&mut self, age: i32) {
        if (15..=64).contains(&age) {
            self.working_age += 1;
        } else {
            self.dependents += 1;
        }
    }

    /// The dependency index, `None` when there is no working-age population.
    pub fn index(&self) -> Option<f64> {
        if self.working_age == 0 {
            None
        } else {
            Some(self.dependents as f64 / self.working_age as f64)
        }
    }
}

/// Per-chunk summary, produced independently by one worker.
///
/// Immutable once returned; the combiner consumes partials by value. All
/// maps are ordered so iteration and merge order stay deterministic.
#[derive(Debug, Clone, Default)]
pub struct PartialAggregate {
    /// Rows seen in the chunk.
    pub records: u64,
    /// Population per social stratum.
    pub stratum_counts: BTreeMap<char, u64>,
    /// Age statistics per (species, gender); only groups with at least one
    /// known age appear.
    pub age_stats: BTreeMap<GroupKey, AgeStats>,
    /// Population per (species, gender, bracket).
    pub bracket_counts: BTreeMap<BracketKey, u64>,
    /// Dependency-ratio tallies.
    pub dependency: DependencyCounts,
    /// Trips per (origin, destination).
    pub flow_counts: BTreeMap<FlowKey, u64>,
    /// Population per (five-year group, gender).
    pub pyramid_counts: BTreeMap<PyramidKey, u64>,
}

/// Derived per-group age summary in the final aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgeSummary {
    /// Records with a known age.
    pub count: u64,
    /// Mean age.
    pub mean: f64,
    /// Median age, from the merged digest.
    pub median: f64,
}

/// The globally merged result, created once after all partials are in.
#[derive(Debug, Clone, Default)]
pub struct FinalAggregate {
    /// Total rows processed.
    pub total_records: u64,
    /// Population per social stratum.
    pub stratum_counts: BTreeMap<char, u64>,
    /// Stratum share of total population, rounded to two decimals.
    pub stratum_percentages: BTreeMap<char, f64>,
    /// Age summary per (species, gender).
    pub age_summary: BTreeMap<GroupKey, AgeSummary>,
    /// Population per (species, gender, bracket).
    pub bracket_counts: BTreeMap<BracketKey, u64>,
    /// Dependency-ratio tallies.
    pub dependency: DependencyCounts,
    /// Dependency index, `None` without a working-age population.
    pub dependency_index: Option<f64>,
    /// Trips per (origin, destination), fully merged.
    pub flow_counts: BTreeMap<FlowKey, u64>,
    /// Busiest flows: count descending, ties by key, truncated to the
    /// top-k bound.
    pub top_flows: Vec<(FlowKey, u64)>,
    /// Population per (five-year group, gender).
    pub pyramid_counts: BTreeMap<PyramidKey, u64>,
}

/// Metadata about one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Path of the analyzed source file.
    pub source: String,
    /// Date and time the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Rows processed.
    pub rows: u64,
    /// Chunks dispatched.
    pub chunks: usize,
    /// Worker threads used.
    pub workers: usize,
    /// Year ages were computed against.
    pub reference_year: i32,
    /// Wall-clock duration in seconds.
    pub duration_seconds: f64,
}

/// One stratum line of the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StratumRow {
    pub stratum: char,
    pub count: u64,
    pub percentage: f64,
}

/// One (species, gender) age line of the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgeRow {
    pub species: String,
    pub gender: String,
    pub count: u64,
    pub value: f64,
}

/// One (species, gender, bracket) line of the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketRow {
    pub species: String,
    pub gender: String,
    pub bracket: String,
    pub count: u64,
}

/// One travel-flow line of the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRow {
    pub origin: String,
    pub destination: String,
    pub count: u64,
}

/// One pyramid cell of the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PyramidRow {
    pub group: String,
    pub gender: String,
    pub count: u64,
}

/// The complete demographic report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Metadata about the run.
    pub metadata: ReportMetadata,
    /// Population per stratum, sorted by stratum key.
    pub strata: Vec<StratumRow>,
    /// Top mean ages by (species, gender).
    pub mean_ages: Vec<AgeRow>,
    /// Top median ages by (species, gender).
    pub median_ages: Vec<AgeRow>,
    /// Top (species, gender, bracket) population counts.
    pub brackets: Vec<BracketRow>,
    /// Where the pyramid chart was written.
    pub chart_path: String,
    /// Dependency index, `None` when undefined.
    pub dependency_index: Option<f64>,
    /// Busiest travel flows.
    pub top_flows: Vec<FlowRow>,
    /// Full pyramid table.
    pub pyramid: Vec<PyramidRow>,
}
