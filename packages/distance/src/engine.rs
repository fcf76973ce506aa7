//! Single-focal and batch distance computation.

use std::{future::Future, ops::Range, sync::Arc};

use futures::{StreamExt as _, stream};
use similarity_region_models::{AttributeTable, RegionKey, RegionRow};
use similarity_timeline::TimelineSource;

use crate::{
    DistanceError, DistanceParams, NeighborDistance, PairwiseDistanceRecord, distances,
    should_compare,
};

/// Computes the distance from `focal` to every other region in `table`.
///
/// Candidates are visited in key order. A candidate is skipped when the
/// eligibility gate rejects the pair (focal first); a focal region with an
/// empty timeline therefore yields no candidates at all.
///
/// # Errors
///
/// Returns [`DistanceError::UnknownRegion`] if `focal` is not in the table.
pub fn compute_single(
    table: &AttributeTable,
    focal: &RegionKey,
    source: &dyn TimelineSource,
    params: &DistanceParams,
) -> Result<Vec<NeighborDistance>, DistanceError> {
    let focal_row = table
        .get(focal)
        .ok_or_else(|| DistanceError::UnknownRegion {
            key: focal.to_string(),
        })?;
    let focal_timeline = source.timeline(focal, Some(focal_row.population()));
    log::debug!(
        "[{focal}] comparing {} days against {} regions",
        focal_timeline.len(),
        table.len().saturating_sub(1)
    );

    let mut candidates = Vec::new();
    for row in table.sorted_by_key() {
        if row.key == *focal {
            continue;
        }
        let timeline = source.timeline(&row.key, Some(row.population()));
        if !should_compare(focal_timeline.len(), timeline.len(), params.max_length_lag) {
            continue;
        }
        candidates.push(NeighborDistance {
            region: row.key.clone(),
            distances: distances(&focal_timeline, &timeline, params),
            same_cluster: row.cluster == focal_row.cluster,
        });
    }

    Ok(candidates)
}

/// Computes the pairs whose first region lies in `focal` (positions in
/// `rows`, which must be sorted by key).
///
/// Each focal region is paired with every region after it, so the union of
/// all chunks covers the upper triangle exactly once.
#[must_use]
pub fn compute_chunk(
    rows: &[RegionRow],
    focal: Range<usize>,
    source: &dyn TimelineSource,
    params: &DistanceParams,
) -> Vec<PairwiseDistanceRecord> {
    let mut records = Vec::new();
    let end = focal.end.min(rows.len());

    for i in focal.start..end {
        let a = &rows[i];
        let timeline_a = source.timeline(&a.key, Some(a.population()));
        if timeline_a.is_empty() {
            continue;
        }
        for b in &rows[i + 1..] {
            let timeline_b = source.timeline(&b.key, Some(b.population()));
            if !should_compare(timeline_a.len(), timeline_b.len(), params.max_length_lag) {
                continue;
            }
            records.push(PairwiseDistanceRecord {
                region_a: a.key.clone(),
                region_b: b.key.clone(),
                distances: distances(&timeline_a, &timeline_b, params),
                same_cluster: a.cluster == b.cluster,
            });
        }
    }

    records
}

/// One chunk of batch work, run to completion on some worker.
pub type ChunkJob = Box<dyn FnOnce() -> Vec<PairwiseDistanceRecord> + Send>;

/// Computes every eligible unordered pair of regions on the runtime's
/// blocking pool.
///
/// See [`compute_all_pairs_with`].
///
/// # Errors
///
/// Returns [`DistanceError::Worker`] if a chunk task panics or is cancelled.
pub async fn compute_all_pairs(
    table: Arc<AttributeTable>,
    source: Arc<dyn TimelineSource>,
    params: DistanceParams,
    workers: usize,
) -> Result<Vec<PairwiseDistanceRecord>, DistanceError> {
    compute_all_pairs_with(table, source, params, workers, |chunk: ChunkJob| async move {
        tokio::task::spawn_blocking(chunk)
            .await
            .map_err(|e| DistanceError::Worker {
                message: e.to_string(),
            })
    })
    .await
}

/// Computes every eligible unordered pair of regions.
///
/// The focal regions are split into chunks of `params.chunk_size`. Each
/// chunk is handed to `spawn` and up to `workers` chunks are in flight at
/// once. Results are concatenated in chunk order, so the output is ordered
/// by `(region_a, region_b)` regardless of chunk size or worker count.
///
/// # Errors
///
/// Returns the first error reported by `spawn`.
pub async fn compute_all_pairs_with<S, Fut>(
    table: Arc<AttributeTable>,
    source: Arc<dyn TimelineSource>,
    params: DistanceParams,
    workers: usize,
    spawn: S,
) -> Result<Vec<PairwiseDistanceRecord>, DistanceError>
where
    S: Fn(ChunkJob) -> Fut,
    Fut: Future<Output = Result<Vec<PairwiseDistanceRecord>, DistanceError>>,
{
    let rows: Arc<Vec<RegionRow>> = Arc::new(table.sorted_by_key().into_iter().cloned().collect());
    let chunk_size = params.chunk_size.max(1);
    let chunks: Vec<Range<usize>> = (0..rows.len())
        .step_by(chunk_size)
        .map(|start| start..(start + chunk_size).min(rows.len()))
        .collect();

    log::info!(
        "Computing pairwise distances for {} regions in {} chunks (workers={workers})",
        rows.len(),
        chunks.len()
    );

    let results: Vec<_> = stream::iter(chunks.into_iter().map(|range| {
        let rows = Arc::clone(&rows);
        let source = Arc::clone(&source);
        spawn(Box::new(move || {
            compute_chunk(&rows, range, source.as_ref(), &params)
        }))
    }))
    .buffered(workers.max(1))
    .collect()
    .await;

    let mut records = Vec::new();
    for result in results {
        records.extend(result?);
    }

    log::info!("Computed {} pairwise distances", records.len());
    Ok(records)
}
