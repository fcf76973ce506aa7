//! Bodies of the background jobs.
//!
//! Everything here runs on a pool worker. Jobs read their inputs, write
//! their artifacts and hand the result back through the task handle; they
//! never touch manager state.

use std::{path::Path, sync::Arc};

use similarity_attributes::{ExtractorDefinition, build_attribute_table, build_extractors};
use similarity_cluster::{ClusterFeature, DEFAULT_DISTANCE_THRESHOLD, cluster_table};
use similarity_distance::{DistanceParams, compute_single, select_neighbors};
use similarity_region_models::{AttributeTable, MetadataIndex, RegionKey};
use similarity_store::{
    ArtifactPaths, Publisher, metadata_hash, read_regions, read_stored_hash, write_neighbors,
    write_regions, write_stored_hash,
};
use similarity_timeline::{TimelineCache, TimelineLoader, TimelineSource};

use crate::{JobError, config::SimilarityConfig};

/// The loaded global state: attribute table, its timelines and the bytes
/// served for it.
pub struct Snapshot {
    /// Clustered attribute table in persisted order.
    pub table: Arc<AttributeTable>,
    /// Timeline cache the table was built against.
    pub timelines: Arc<dyn TimelineSource>,
    /// Hash of the metadata document the table reflects.
    pub metadata_hash: String,
    /// Contents of `regions.csv`.
    pub regions_csv: Arc<[u8]>,
}

/// Builds or reloads the global table.
///
/// The persisted table is reused when its stored metadata hash matches the
/// current document. Otherwise it is rebuilt, persisted and published.
///
/// # Errors
///
/// Returns [`JobError`] if the metadata cannot be read, clustering fails,
/// or the table cannot be persisted.
pub fn build_snapshot(
    config: &SimilarityConfig,
    extractors: &[ExtractorDefinition],
    publisher: &dyn Publisher,
) -> Result<Snapshot, JobError> {
    let bytes = std::fs::read(config.metadata_path())?;
    let hash = metadata_hash(&bytes);
    let metadata = Arc::new(MetadataIndex::from_json_slice(&bytes)?);
    let timelines: Arc<dyn TimelineSource> = Arc::new(TimelineCache::new(TimelineLoader::new(
        &config.data_dir,
        Arc::clone(&metadata),
    )));
    let paths = ArtifactPaths::new(config.output_dir());

    let table = if let Some(table) = load_current(&paths, &hash) {
        log::info!("Region table is current ({} regions)", table.len());
        table
    } else {
        let table = build_table(config, &metadata, extractors, timelines.as_ref())?;
        write_regions(&paths.regions_csv(), &table)?;
        write_stored_hash(&paths.metadata_hash(), &hash)?;
        log::info!(
            "Wrote region table: {} regions in {} clusters",
            table.len(),
            table.cluster_count()
        );
        publish(publisher, "region table");
        table
    };

    let regions_csv = std::fs::read(paths.regions_csv())?;
    Ok(Snapshot {
        table: Arc::new(table),
        timelines,
        metadata_hash: hash,
        regions_csv: Arc::from(regions_csv),
    })
}

fn load_current(paths: &ArtifactPaths, hash: &str) -> Option<AttributeTable> {
    let stored = read_stored_hash(&paths.metadata_hash())?;
    if stored != hash {
        log::info!("Metadata changed since the last build");
        return None;
    }
    match read_regions(&paths.regions_csv()) {
        Ok(table) if !table.is_empty() => Some(table),
        Ok(_) => None,
        Err(e) => {
            log::warn!("Discarding unreadable region table: {e}");
            None
        }
    }
}

fn build_table(
    config: &SimilarityConfig,
    metadata: &MetadataIndex,
    extractors: &[ExtractorDefinition],
    timelines: &dyn TimelineSource,
) -> Result<AttributeTable, JobError> {
    let ctx = config.extract_context();
    let extractors = build_extractors(extractors, &ctx);
    let mut table = build_attribute_table(metadata, &extractors, &ctx);

    let labels = cluster_table(&table, ClusterFeature::DEFAULT, DEFAULT_DISTANCE_THRESHOLD)?;
    table.assign_clusters(&labels)?;

    let days: Vec<(RegionKey, usize)> = table
        .rows()
        .iter()
        .map(|row| {
            let timeline = timelines.timeline(&row.key, Some(row.population()));
            (row.key.clone(), timeline.len())
        })
        .collect();
    for (key, len) in days {
        if let Some(row) = table.get_mut(&key) {
            row.days = len;
        }
    }

    table.sort_by_cluster();
    Ok(table)
}

/// Computes, persists and publishes the neighbor table of `key`.
///
/// # Errors
///
/// Returns [`JobError`] if the key is not in the table or the result cannot
/// be written.
pub fn compute_region(
    snapshot: &Snapshot,
    key: &RegionKey,
    params: &DistanceParams,
    top_k: usize,
    path: &Path,
    publisher: &dyn Publisher,
) -> Result<(), JobError> {
    log::info!("[{key}] computing neighbors");
    let candidates = compute_single(&snapshot.table, key, snapshot.timelines.as_ref(), params)?;
    let neighbors = select_neighbors(candidates, top_k);
    write_neighbors(path, &neighbors)?;
    log::info!("[{key}] wrote {} neighbors", neighbors.len());
    publish(publisher, key.as_str());
    Ok(())
}

fn publish(publisher: &dyn Publisher, what: &str) {
    if let Err(e) = publisher.publish() {
        log::warn!("[{what}] publish failed: {e}");
    }
}
