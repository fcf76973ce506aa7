#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pairwise epidemic-curve distances between regions.
//!
//! Two regions are compared on the trailing window of their overlapping
//! timelines (both series aligned at their first reported case). For each
//! of four features the day-by-day absolute difference is averaged with
//! weights that favour recent days, yielding a [`FeatureDistances`].
//!
//! Two modes are provided:
//!
//! * **single** ([`compute_single`]): one focal region against every other
//!   tracked region, feeding [`select_neighbors`] to produce the region's
//!   ranked "most similar" table
//! * **batch** ([`compute_all_pairs`]): the upper triangle of the full pair
//!   matrix in key order, split into focal-region chunks processed in
//!   parallel

pub mod engine;
pub mod metric;
pub mod neighbors;

use serde::{Deserialize, Serialize};
use similarity_region_models::RegionKey;
use similarity_timeline::TimelineRecord;
use strum_macros::{AsRefStr, Display, EnumString};

pub use engine::{
    ChunkJob, compute_all_pairs, compute_all_pairs_with, compute_chunk, compute_single,
};
pub use metric::{distances, should_compare, weighted_distance, window};
pub use neighbors::{DEFAULT_TOP_K, select_neighbors};

/// Trailing window length used when none is configured.
pub const DEFAULT_WINDOW_DAYS: usize = 10;

/// How much shorter a candidate timeline may be than the focal one.
pub const DEFAULT_MAX_LENGTH_LAG: usize = 30;

/// Focal regions per batch-mode chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Errors that can occur while computing distances.
#[derive(Debug, thiserror::Error)]
pub enum DistanceError {
    /// The focal region is not in the attribute table.
    #[error("Unknown region: {key}")]
    UnknownRegion {
        /// The missing key.
        key: String,
    },

    /// A batch worker panicked or was cancelled.
    #[error("Distance worker failed: {message}")]
    Worker {
        /// Description of the failure.
        message: String,
    },
}

/// Timeline features compared between regions.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DistanceFeature {
    /// Daily new cases.
    Cases,
    /// Daily new deaths.
    Deaths,
    /// Daily new cases per 100,000 residents.
    #[strum(serialize = "cases_per_100k")]
    #[serde(rename = "cases_per_100k")]
    CasesPer100k,
    /// Daily new deaths per 100,000 residents.
    #[strum(serialize = "deaths_per_100k")]
    #[serde(rename = "deaths_per_100k")]
    DeathsPer100k,
}

impl DistanceFeature {
    /// Every feature, in persisted column order.
    pub const ALL: [Self; 4] = [
        Self::Cases,
        Self::Deaths,
        Self::CasesPer100k,
        Self::DeathsPer100k,
    ];

    /// Reads this feature from a timeline record.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn value(self, record: &TimelineRecord) -> Option<f64> {
        match self {
            Self::Cases => Some(record.daily_cases as f64),
            Self::Deaths => Some(record.daily_deaths as f64),
            Self::CasesPer100k => record.cases_per_100k,
            Self::DeathsPer100k => record.deaths_per_100k,
        }
    }
}

/// Tunables of the distance engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistanceParams {
    /// Trailing window length in days; `0` compares the whole overlap.
    pub window_days: usize,
    /// A candidate is skipped when its timeline is more than this many days
    /// shorter than the focal region's.
    pub max_length_lag: usize,
    /// Focal regions per batch-mode chunk.
    pub chunk_size: usize,
}

impl Default for DistanceParams {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
            max_length_lag: DEFAULT_MAX_LENGTH_LAG,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// The four per-feature distances between two regions.
///
/// The per-100k distances are absent when either region has no known
/// population.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureDistances {
    /// Distance on daily cases.
    pub cases: f64,
    /// Distance on daily deaths.
    pub deaths: f64,
    /// Distance on daily cases per 100k.
    pub cases_per_100k: Option<f64>,
    /// Distance on daily deaths per 100k.
    pub deaths_per_100k: Option<f64>,
}

impl FeatureDistances {
    /// Distance on one feature.
    #[must_use]
    pub const fn get(&self, feature: DistanceFeature) -> Option<f64> {
        match feature {
            DistanceFeature::Cases => Some(self.cases),
            DistanceFeature::Deaths => Some(self.deaths),
            DistanceFeature::CasesPer100k => self.cases_per_100k,
            DistanceFeature::DeathsPer100k => self.deaths_per_100k,
        }
    }
}

/// Distance from a focal region to one candidate (single mode).
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborDistance {
    /// Candidate region.
    pub region: RegionKey,
    /// Per-feature distances to the focal region.
    pub distances: FeatureDistances,
    /// Whether the candidate shares the focal region's cluster label.
    pub same_cluster: bool,
}

/// Distance between an unordered pair of regions (batch mode).
#[derive(Debug, Clone, PartialEq)]
pub struct PairwiseDistanceRecord {
    /// The region earlier in key order.
    pub region_a: RegionKey,
    /// The region later in key order.
    pub region_b: RegionKey,
    /// Per-feature distances.
    pub distances: FeatureDistances,
    /// Whether both regions share a cluster label.
    pub same_cluster: bool,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_column_names() {
        let names: Vec<String> = DistanceFeature::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(names, ["cases", "deaths", "cases_per_100k", "deaths_per_100k"]);
        assert_eq!(
            "deaths_per_100k".parse::<DistanceFeature>(),
            Ok(DistanceFeature::DeathsPer100k)
        );
    }
}
