#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Daily case/death timelines for tracked regions.
//!
//! Raw upstream files report counts in different conventions (cumulative or
//! incremental, with gaps, with downward corrections). [`normalize`] turns
//! them into a canonical [`Timeline`]: one record per calendar day starting
//! at the first reported case, with non-decreasing cumulative columns and
//! non-negative daily deltas.
//!
//! Timelines are read lazily through a [`TimelineSource`]. The production
//! implementation is [`TimelineCache`], which loads each region's file once
//! and keeps the result for as long as the cache itself lives.

pub mod cache;
pub mod normalize;
pub mod reader;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use similarity_region_models::RegionKey;

pub use cache::{TimelineCache, TimelineLoader};
pub use normalize::{RawObservation, normalize};

/// Errors that can occur while building a timeline.
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    /// The key does not resolve to any entry of the metadata document.
    #[error("Unknown region key: {key}")]
    UnknownKey {
        /// The unresolved key.
        key: String,
    },

    /// A required column is missing from the file header.
    #[error("Missing column '{column}'")]
    MissingColumn {
        /// Name of the missing column.
        column: String,
    },

    /// A date cell could not be parsed.
    #[error("Invalid date '{value}' on line {line}")]
    InvalidDate {
        /// The raw cell value.
        value: String,
        /// 1-based line number in the source file.
        line: u64,
    },

    /// A count cell could not be parsed.
    #[error("Invalid count '{value}' in column '{column}' on line {line}")]
    InvalidCount {
        /// The raw cell value.
        value: String,
        /// Column the value was read from.
        column: String,
        /// 1-based line number in the source file.
        line: u64,
    },

    /// CSV decoding failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error reading the file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One day of a normalized timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineRecord {
    /// Calendar day.
    pub date: NaiveDate,
    /// Cases reported up to and including this day.
    pub cumulative_cases: u64,
    /// Cases reported on this day.
    pub daily_cases: u64,
    /// Deaths reported up to and including this day.
    pub cumulative_deaths: u64,
    /// Deaths reported on this day.
    pub daily_deaths: u64,
    /// Daily cases per 100,000 residents, when population is known.
    pub cases_per_100k: Option<f64>,
    /// Daily deaths per 100,000 residents, when population is known.
    pub deaths_per_100k: Option<f64>,
}

/// A gap-free daily series, oldest day first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    records: Vec<TimelineRecord>,
}

impl Timeline {
    /// An empty timeline ("no data").
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Number of days.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if there is no data for the region.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records, oldest first.
    #[must_use]
    pub fn records(&self) -> &[TimelineRecord] {
        &self.records
    }

    /// First day of the timeline.
    #[must_use]
    pub fn start(&self) -> Option<NaiveDate> {
        self.records.first().map(|r| r.date)
    }

    /// Returns `true` if per-100k columns are present.
    #[must_use]
    pub fn has_per_100k(&self) -> bool {
        self.records.first().is_some_and(|r| r.cases_per_100k.is_some())
    }
}

impl From<Vec<TimelineRecord>> for Timeline {
    fn from(records: Vec<TimelineRecord>) -> Self {
        Self { records }
    }
}

/// Anything that can hand out a region's timeline.
///
/// Implementations never fail: a region whose timeline cannot be built is
/// reported as an empty timeline, which the distance engine's eligibility
/// gate then skips.
pub trait TimelineSource: Send + Sync {
    /// Returns the normalized timeline for `key`.
    ///
    /// `population` enables the per-100k columns; `None` or `Some(0)` omits
    /// them.
    fn timeline(&self, key: &RegionKey, population: Option<u64>) -> Arc<Timeline>;
}

/// A fixed, in-memory set of timelines.
///
/// Keys that were never inserted yield an empty timeline.
#[derive(Debug, Clone, Default)]
pub struct StaticTimelines {
    timelines: BTreeMap<RegionKey, Arc<Timeline>>,
}

impl StaticTimelines {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the timeline for `key`.
    pub fn insert(&mut self, key: RegionKey, timeline: Timeline) {
        self.timelines.insert(key, Arc::new(timeline));
    }
}

impl TimelineSource for StaticTimelines {
    fn timeline(&self, key: &RegionKey, _population: Option<u64>) -> Arc<Timeline> {
        self.timelines
            .get(key)
            .cloned()
            .unwrap_or_else(|| Arc::new(Timeline::empty()))
    }
}
