//! Top-K neighbor selection.

use std::{cmp::Ordering, collections::BTreeSet};

use crate::{DistanceFeature, NeighborDistance};

/// Neighbors kept per feature when none is configured.
pub const DEFAULT_TOP_K: usize = 100;

fn by_distance_then_region(a: &NeighborDistance, b: &NeighborDistance) -> Ordering {
    a.distances
        .cases
        .total_cmp(&b.distances.cases)
        .then_with(|| a.distances.deaths.total_cmp(&b.distances.deaths))
        .then_with(|| a.region.cmp(&b.region))
}

/// Picks the "most similar regions" out of a focal region's candidates.
///
/// For each feature independently, the `top_k` candidates with the smallest
/// distance are taken (ties broken by region key; candidates missing the
/// feature are ignored for it). The four sets are unioned, and every
/// same-cluster candidate is added regardless of rank.
///
/// The result is ordered by cases distance, then deaths distance, then
/// region key.
#[must_use]
pub fn select_neighbors(
    mut candidates: Vec<NeighborDistance>,
    top_k: usize,
) -> Vec<NeighborDistance> {
    let mut keep: BTreeSet<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.same_cluster)
        .map(|(i, _)| i)
        .collect();

    for feature in DistanceFeature::ALL {
        let mut ranked: Vec<(f64, usize)> = candidates
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.distances.get(feature).map(|d| (d, i)))
            .collect();
        ranked.sort_by(|(da, ia), (db, ib)| {
            da.total_cmp(db)
                .then_with(|| candidates[*ia].region.cmp(&candidates[*ib].region))
        });
        keep.extend(ranked.into_iter().take(top_k).map(|(_, i)| i));
    }

    let mut index = 0;
    candidates.retain(|_| {
        let kept = keep.contains(&index);
        index += 1;
        kept
    });
    candidates.sort_by(by_distance_then_region);
    candidates
}
