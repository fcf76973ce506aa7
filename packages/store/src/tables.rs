//! Delimited-table persistence.
//!
//! Every table is written with a fixed header row, even when it has no data
//! rows, and lands on disk through [`write_atomic`] so readers never see a
//! partially written file.

use std::{
    io::Write as _,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use similarity_distance::{NeighborDistance, PairwiseDistanceRecord};
use similarity_region_models::{AttributeTable, RegionKey, RegionRow};

use crate::StoreError;

const REGIONS_HEADER: [&str; 6] = [
    "key",
    "population",
    "area_km",
    "population_density",
    "cluster",
    "days",
];

const NEIGHBORS_HEADER: [&str; 6] = [
    "region",
    "cases_distance",
    "deaths_distance",
    "cases_per_100k_distance",
    "deaths_per_100k_distance",
    "is_same_cluster",
];

const PAIRS_HEADER: [&str; 7] = [
    "region_a",
    "region_b",
    "cases_distance",
    "deaths_distance",
    "cases_per_100k_distance",
    "deaths_per_100k_distance",
    "is_same_cluster",
];

/// One row of a per-region neighbor table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborRow {
    /// Candidate region.
    pub region: RegionKey,
    /// Distance on daily cases.
    pub cases_distance: f64,
    /// Distance on daily deaths.
    pub deaths_distance: f64,
    /// Distance on daily cases per 100k, when both populations are known.
    pub cases_per_100k_distance: Option<f64>,
    /// Distance on daily deaths per 100k, when both populations are known.
    pub deaths_per_100k_distance: Option<f64>,
    /// Whether the candidate shares the focal region's cluster.
    pub is_same_cluster: bool,
}

impl From<&NeighborDistance> for NeighborRow {
    fn from(n: &NeighborDistance) -> Self {
        Self {
            region: n.region.clone(),
            cases_distance: n.distances.cases,
            deaths_distance: n.distances.deaths,
            cases_per_100k_distance: n.distances.cases_per_100k,
            deaths_per_100k_distance: n.distances.deaths_per_100k,
            is_same_cluster: n.same_cluster,
        }
    }
}

/// One row of the batch-mode pair table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairRow {
    /// Region earlier in key order.
    pub region_a: RegionKey,
    /// Region later in key order.
    pub region_b: RegionKey,
    /// Distance on daily cases.
    pub cases_distance: f64,
    /// Distance on daily deaths.
    pub deaths_distance: f64,
    /// Distance on daily cases per 100k.
    pub cases_per_100k_distance: Option<f64>,
    /// Distance on daily deaths per 100k.
    pub deaths_per_100k_distance: Option<f64>,
    /// Whether both regions share a cluster.
    pub is_same_cluster: bool,
}

impl From<&PairwiseDistanceRecord> for PairRow {
    fn from(r: &PairwiseDistanceRecord) -> Self {
        Self {
            region_a: r.region_a.clone(),
            region_b: r.region_b.clone(),
            cases_distance: r.distances.cases,
            deaths_distance: r.distances.deaths,
            cases_per_100k_distance: r.distances.cases_per_100k,
            deaths_per_100k_distance: r.distances.deaths_per_100k,
            is_same_cluster: r.same_cluster,
        }
    }
}

/// Writes `bytes` to a sibling temporary file, then renames it over `path`.
///
/// Concurrent writers of the same path resolve as last-writer-wins.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created or the file
/// cannot be written or renamed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir(parent)?;
    }
    let tmp = temp_sibling(path);

    let result = std::fs::File::create(&tmp)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|()| std::fs::rename(&tmp, path));

    if let Err(e) = result {
        std::fs::remove_file(&tmp).ok();
        return Err(e.into());
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4()))
}

fn to_csv<T: Serialize>(
    header: &[&str],
    rows: impl IntoIterator<Item = T>,
) -> Result<Vec<u8>, StoreError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| StoreError::Io(e.into_error()))
}

fn from_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let mut reader = csv::Reader::from_path(path)?;
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(Into::into)
}

/// Writes the global table, rows ordered by `(cluster, key)`.
///
/// # Errors
///
/// Returns [`StoreError`] if serialization or the write fails.
pub fn write_regions(path: &Path, table: &AttributeTable) -> Result<(), StoreError> {
    let mut rows: Vec<&RegionRow> = table.rows().iter().collect();
    rows.sort_by(|a, b| a.cluster.cmp(&b.cluster).then_with(|| a.key.cmp(&b.key)));
    let bytes = to_csv(&REGIONS_HEADER, rows)?;
    write_atomic(path, &bytes)
}

/// Reads a global table written by [`write_regions`].
///
/// # Errors
///
/// Returns [`StoreError`] if the file is missing, malformed, or has
/// duplicate keys.
pub fn read_regions(path: &Path) -> Result<AttributeTable, StoreError> {
    let rows: Vec<RegionRow> = from_csv(path)?;
    Ok(AttributeTable::from_rows(rows)?)
}

/// Writes one region's neighbor table in the given order.
///
/// # Errors
///
/// Returns [`StoreError`] if serialization or the write fails.
pub fn write_neighbors(path: &Path, neighbors: &[NeighborDistance]) -> Result<(), StoreError> {
    let bytes = to_csv(&NEIGHBORS_HEADER, neighbors.iter().map(NeighborRow::from))?;
    write_atomic(path, &bytes)
}

/// Reads a neighbor table written by [`write_neighbors`].
///
/// # Errors
///
/// Returns [`StoreError`] if the file is missing or malformed.
pub fn read_neighbors(path: &Path) -> Result<Vec<NeighborRow>, StoreError> {
    from_csv(path)
}

/// Writes the batch-mode pair table.
///
/// # Errors
///
/// Returns [`StoreError`] if serialization or the write fails.
pub fn write_pairs(path: &Path, pairs: &[PairwiseDistanceRecord]) -> Result<(), StoreError> {
    let bytes = to_csv(&PAIRS_HEADER, pairs.iter().map(PairRow::from))?;
    write_atomic(path, &bytes)
}
