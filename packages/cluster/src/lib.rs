#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hierarchical similarity clustering over static region attributes.
//!
//! Selected numeric columns of the [`AttributeTable`] are standardized to
//! zero mean and unit variance, then grouped by bottom-up agglomerative
//! clustering with Ward linkage. There is no target cluster count: merges
//! stop at a fixed linkage distance ([`DEFAULT_DISTANCE_THRESHOLD`]), so the
//! number of clusters is driven by the data.

pub mod linkage;
pub mod standardize;

use serde::{Deserialize, Serialize};
use similarity_region_models::{AttributeTable, RegionRow};
use strum_macros::{AsRefStr, Display, EnumString};

pub use linkage::{Merge, cut, ward_linkage};
pub use standardize::standardize;

/// Linkage distance at or above which clusters are never merged.
pub const DEFAULT_DISTANCE_THRESHOLD: f64 = 0.1;

/// Errors that can occur while clustering.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClusterError {
    /// Clustering needs at least two rows.
    #[error("Cannot cluster {rows} row(s); at least 2 are required")]
    TooFewRows {
        /// Number of rows supplied.
        rows: usize,
    },

    /// No feature columns were selected.
    #[error("No feature columns selected")]
    NoFeatures,

    /// Rows have different numbers of columns.
    #[error("Row {row} has {actual} columns, expected {expected}")]
    Ragged {
        /// Index of the offending row.
        row: usize,
        /// Column count of the first row.
        expected: usize,
        /// Column count of the offending row.
        actual: usize,
    },

    /// A value is NaN or infinite.
    #[error("Non-finite value in row {row}, column {column}")]
    NonFinite {
        /// Index of the offending row.
        row: usize,
        /// Index of the offending column.
        column: usize,
    },
}

/// Attribute columns that can take part in clustering.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ClusterFeature {
    /// Resident population.
    Population,
    /// Land area in square kilometres.
    AreaKm,
    /// Population per square kilometre.
    PopulationDensity,
}

impl ClusterFeature {
    /// Population and area, the default selection.
    pub const DEFAULT: &[Self] = &[Self::Population, Self::AreaKm];

    /// Reads this column from a row.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn value(self, row: &RegionRow) -> f64 {
        match self {
            Self::Population => row.population() as f64,
            Self::AreaKm => row.area_km(),
            Self::PopulationDensity => row.population_density(),
        }
    }
}

/// Clusters raw (unstandardized) points.
///
/// Returns one label per point. Labels are numbered `0..k` in order of
/// first appearance, so identical input always yields identical labels.
///
/// # Errors
///
/// Returns [`ClusterError`] for fewer than two points, ragged or empty
/// rows, or non-finite values.
pub fn cluster_points(points: &[Vec<f64>], threshold: f64) -> Result<Vec<u32>, ClusterError> {
    if points.len() < 2 {
        return Err(ClusterError::TooFewRows { rows: points.len() });
    }
    let standardized = standardize(points)?;
    let merges = ward_linkage(&standardized);
    Ok(cut(&merges, points.len(), threshold))
}

/// Clusters the rows of `table` on the selected columns.
///
/// Labels are returned in table row order; apply them with
/// [`AttributeTable::assign_clusters`].
///
/// # Errors
///
/// Returns [`ClusterError`] if the table has fewer than two rows, no
/// features are selected, or any selected value is non-finite.
pub fn cluster_table(
    table: &AttributeTable,
    features: &[ClusterFeature],
    threshold: f64,
) -> Result<Vec<u32>, ClusterError> {
    if features.is_empty() {
        return Err(ClusterError::NoFeatures);
    }
    log::debug!(
        "[cluster_table] clustering {} rows on {features:?}",
        table.len()
    );

    let points: Vec<Vec<f64>> = table
        .rows()
        .iter()
        .map(|row| features.iter().map(|f| f.value(row)).collect())
        .collect();

    let labels = cluster_points(&points, threshold)?;
    log::debug!(
        "[cluster_table] found {} clusters",
        labels.iter().max().map_or(0, |&m| m + 1)
    );
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_fewer_than_two_rows() {
        assert_eq!(
            cluster_points(&[], DEFAULT_DISTANCE_THRESHOLD),
            Err(ClusterError::TooFewRows { rows: 0 })
        );
        assert_eq!(
            cluster_points(&[vec![1.0, 2.0]], DEFAULT_DISTANCE_THRESHOLD),
            Err(ClusterError::TooFewRows { rows: 1 })
        );
    }

    #[test]
    fn groups_tight_clumps() {
        let points = vec![
            vec![1_000.0, 10.0],
            vec![1_001.0, 10.0],
            vec![50_000.0, 900.0],
            vec![50_010.0, 901.0],
            vec![1_002.0, 10.0],
        ];
        let labels = cluster_points(&points, DEFAULT_DISTANCE_THRESHOLD).unwrap();
        assert_eq!(labels, [0, 0, 1, 1, 0]);
    }

    #[test]
    fn spread_points_stay_apart() {
        let points = vec![vec![0.0], vec![10.0], vec![20.0], vec![30.0]];
        let labels = cluster_points(&points, DEFAULT_DISTANCE_THRESHOLD).unwrap();
        assert_eq!(labels, [0, 1, 2, 3]);
    }

    #[test]
    fn identical_points_share_a_label() {
        let points = vec![vec![5.0, 5.0], vec![5.0, 5.0]];
        let labels = cluster_points(&points, DEFAULT_DISTANCE_THRESHOLD).unwrap();
        assert_eq!(labels, [0, 0]);
    }

    #[test]
    fn clusters_table_rows() {
        let table = AttributeTable::from_rows([
            RegionRow::new("a".into(), 1_000_000, 500.0),
            RegionRow::new("b".into(), 1_000_100, 500.0),
            RegionRow::new("c".into(), 90_000_000, 300_000.0),
        ])
        .unwrap();
        let labels =
            cluster_table(&table, ClusterFeature::DEFAULT, DEFAULT_DISTANCE_THRESHOLD).unwrap();
        assert_eq!(labels, [0, 0, 1]);
    }

    #[test]
    fn table_requires_features() {
        let table = AttributeTable::from_rows([
            RegionRow::new("a".into(), 1, 1.0),
            RegionRow::new("b".into(), 2, 2.0),
        ])
        .unwrap();
        assert_eq!(
            cluster_table(&table, &[], DEFAULT_DISTANCE_THRESHOLD),
            Err(ClusterError::NoFeatures)
        );
    }

    #[test]
    fn feature_names_round_trip() {
        assert_eq!(ClusterFeature::AreaKm.to_string(), "area_km");
        assert_eq!(
            "population_density".parse::<ClusterFeature>(),
            Ok(ClusterFeature::PopulationDensity)
        );
    }
}
