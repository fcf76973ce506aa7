#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Region keys, attribute rows, and upstream metadata types.
//!
//! A region is identified by a dotted [`RegionKey`]: either a bare country
//! (`"Sweden"`) or a sub-region (`"Sweden.regions.Stockholm"`). The
//! [`AttributeTable`] holds one [`RegionRow`] per key and is the unit the
//! clusterer, the distance engine and the cache manager pass around.

pub mod metadata;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use metadata::{ColumnSemantics, CountryMetadata, MetadataIndex, RegionMetadata, SourceDescriptor};

/// Separator between a country and one of its sub-regions in a key.
pub const REGIONS_SEPARATOR: &str = ".regions.";

/// Errors raised while assembling or mutating an [`AttributeTable`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    /// A row with the same key is already present.
    #[error("Duplicate region key: {key}")]
    DuplicateKey {
        /// The offending key.
        key: String,
    },

    /// A per-row column was supplied with the wrong number of values.
    #[error("Expected {expected} values, got {actual}")]
    LengthMismatch {
        /// Number of rows in the table.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },
}

/// Dotted region identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionKey(String);

impl RegionKey {
    /// Wraps a raw key string.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Builds the key of a sub-region of `country`.
    #[must_use]
    pub fn subregion(country: &str, region: &str) -> Self {
        Self(format!("{country}{REGIONS_SEPARATOR}{region}"))
    }

    /// The raw key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The country part of the key.
    #[must_use]
    pub fn country(&self) -> &str {
        self.0
            .split_once(REGIONS_SEPARATOR)
            .map_or(self.0.as_str(), |(country, _)| country)
    }

    /// The sub-region part of the key, if this is not a top-level country.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.0
            .split_once(REGIONS_SEPARATOR)
            .map(|(_, region)| region)
    }

    /// Returns `true` for bare country keys.
    #[must_use]
    pub fn is_country(&self) -> bool {
        self.region().is_none()
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegionKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RegionKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Raw output of an attribute extractor, before density and clustering.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeRow {
    /// Region key.
    pub key: RegionKey,
    /// Resident population.
    pub population: u64,
    /// Land area in square kilometres.
    pub area_km: f64,
}

impl AttributeRow {
    /// Creates a new attribute row.
    #[must_use]
    pub fn new(key: RegionKey, population: u64, area_km: f64) -> Self {
        Self {
            key,
            population,
            area_km,
        }
    }
}

/// One row of the global table.
///
/// Column order matches the persisted `regions.csv` header:
/// `key,population,area_km,population_density,cluster,days`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRow {
    /// Region key.
    pub key: RegionKey,
    population: u64,
    area_km: f64,
    population_density: f64,
    /// Cluster label assigned by the last clustering pass.
    pub cluster: u32,
    /// Length of the region's normalized timeline.
    pub days: usize,
}

impl RegionRow {
    /// Creates an unclustered row with zero days.
    #[must_use]
    pub fn new(key: RegionKey, population: u64, area_km: f64) -> Self {
        Self {
            key,
            population,
            area_km,
            population_density: density(population, area_km),
            cluster: 0,
            days: 0,
        }
    }

    /// Resident population.
    #[must_use]
    pub const fn population(&self) -> u64 {
        self.population
    }

    /// Land area in square kilometres.
    #[must_use]
    pub const fn area_km(&self) -> f64 {
        self.area_km
    }

    /// Population per square kilometre.
    #[must_use]
    pub const fn population_density(&self) -> f64 {
        self.population_density
    }

    /// Updates the population and the derived density.
    pub fn set_population(&mut self, population: u64) {
        self.population = population;
        self.population_density = density(self.population, self.area_km);
    }

    /// Updates the area and the derived density.
    pub fn set_area_km(&mut self, area_km: f64) {
        self.area_km = area_km;
        self.population_density = density(self.population, self.area_km);
    }

    fn refresh_density(&mut self) {
        self.population_density = density(self.population, self.area_km);
    }
}

impl From<AttributeRow> for RegionRow {
    fn from(row: AttributeRow) -> Self {
        Self::new(row.key, row.population, row.area_km)
    }
}

#[allow(clippy::cast_precision_loss)]
fn density(population: u64, area_km: f64) -> f64 {
    if area_km > 0.0 {
        population as f64 / area_km
    } else {
        0.0
    }
}

/// The set of tracked regions, unique by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeTable {
    rows: Vec<RegionRow>,
    index: BTreeMap<RegionKey, usize>,
}

impl AttributeTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from already-complete rows (e.g. loaded from disk).
    ///
    /// Density is recomputed from population and area.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::DuplicateKey`] if two rows share a key.
    pub fn from_rows(rows: impl IntoIterator<Item = RegionRow>) -> Result<Self, TableError> {
        let mut table = Self::new();
        for mut row in rows {
            row.refresh_density();
            table.insert(row)?;
        }
        Ok(table)
    }

    /// Appends a row.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::DuplicateKey`] if the key is already present.
    pub fn insert(&mut self, row: RegionRow) -> Result<(), TableError> {
        if self.index.contains_key(&row.key) {
            return Err(TableError::DuplicateKey {
                key: row.key.to_string(),
            });
        }
        self.index.insert(row.key.clone(), self.rows.len());
        self.rows.push(row);
        Ok(())
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in table order.
    #[must_use]
    pub fn rows(&self) -> &[RegionRow] {
        &self.rows
    }

    /// Looks up a row by key.
    #[must_use]
    pub fn get(&self, key: &RegionKey) -> Option<&RegionRow> {
        self.index.get(key).map(|&i| &self.rows[i])
    }

    /// Looks up a row by key for mutation.
    pub fn get_mut(&mut self, key: &RegionKey) -> Option<&mut RegionRow> {
        self.index.get(key).map(|&i| &mut self.rows[i])
    }

    /// Rows ordered by key.
    #[must_use]
    pub fn sorted_by_key(&self) -> Vec<&RegionRow> {
        self.index.values().map(|&i| &self.rows[i]).collect()
    }

    /// Assigns one cluster label per row, in table order.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::LengthMismatch`] if `labels` does not have one
    /// entry per row.
    pub fn assign_clusters(&mut self, labels: &[u32]) -> Result<(), TableError> {
        if labels.len() != self.rows.len() {
            return Err(TableError::LengthMismatch {
                expected: self.rows.len(),
                actual: labels.len(),
            });
        }
        for (row, &label) in self.rows.iter_mut().zip(labels) {
            row.cluster = label;
        }
        Ok(())
    }

    /// Number of distinct cluster labels.
    #[must_use]
    pub fn cluster_count(&self) -> usize {
        let mut labels: Vec<u32> = self.rows.iter().map(|r| r.cluster).collect();
        labels.sort_unstable();
        labels.dedup();
        labels.len()
    }

    /// Reorders rows by `(cluster, key)`, the persisted order.
    pub fn sort_by_cluster(&mut self) {
        self.rows
            .sort_by(|a, b| a.cluster.cmp(&b.cluster).then_with(|| a.key.cmp(&b.key)));
        self.reindex();
    }

    fn reindex(&mut self) {
        self.index = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row.key.clone(), i))
            .collect();
    }
}
