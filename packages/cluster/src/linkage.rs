//! Ward-linkage agglomerative clustering.
//!
//! The dendrogram is built with the nearest-neighbour chain algorithm,
//! which is exact for reducible linkages such as Ward and needs only the
//! current cluster centroids (O(n) memory, O(n²) distance evaluations).
//!
//! The Ward distance between clusters `A` and `B` is
//! `sqrt(2·|A|·|B| / (|A| + |B|)) · ‖c_A − c_B‖`, which for two single
//! points is their Euclidean distance.

/// One merge step of the dendrogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    /// A point belonging to the first merged cluster.
    pub left: usize,
    /// A point belonging to the second merged cluster.
    pub right: usize,
    /// Linkage distance at which the merge happened.
    pub distance: f64,
    /// Size of the merged cluster.
    pub size: usize,
}

struct Node {
    centroid: Vec<f64>,
    size: usize,
}

#[allow(clippy::cast_precision_loss)]
fn ward_distance(a: &Node, b: &Node) -> f64 {
    let squared: f64 = a
        .centroid
        .iter()
        .zip(&b.centroid)
        .map(|(x, y)| (x - y).powi(2))
        .sum();
    let (na, nb) = (a.size as f64, b.size as f64);
    (2.0 * na * nb / (na + nb) * squared).sqrt()
}

/// Builds the full Ward dendrogram of `points` (`points.len() - 1` merges).
///
/// Merges are returned in the order the chain discovers them, which is not
/// necessarily ascending by distance. Ties are broken toward the previous
/// chain element, then toward the lowest point index, so the result is
/// deterministic.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn ward_linkage(points: &[Vec<f64>]) -> Vec<Merge> {
    let mut nodes: Vec<Option<Node>> = points
        .iter()
        .map(|p| {
            Some(Node {
                centroid: p.clone(),
                size: 1,
            })
        })
        .collect();
    let mut active = points.len();
    let mut merges = Vec::with_capacity(points.len().saturating_sub(1));
    let mut chain: Vec<usize> = Vec::new();

    while active > 1 {
        if chain.is_empty() {
            let Some(start) = nodes.iter().position(Option::is_some) else {
                break;
            };
            chain.push(start);
        }

        let tip = chain[chain.len() - 1];
        let prev = chain.len().checked_sub(2).map(|i| chain[i]);
        let Some(tip_node) = nodes[tip].as_ref() else {
            break;
        };

        let mut best = prev.and_then(|p| {
            nodes[p]
                .as_ref()
                .map(|node| (p, ward_distance(tip_node, node)))
        });
        for (j, node) in nodes.iter().enumerate() {
            let Some(node) = node else { continue };
            if j == tip {
                continue;
            }
            let d = ward_distance(tip_node, node);
            if best.is_none_or(|(_, best_d)| d < best_d) {
                best = Some((j, d));
            }
        }

        let Some((nearest, distance)) = best else {
            break;
        };

        if Some(nearest) != prev {
            chain.push(nearest);
            continue;
        }

        chain.truncate(chain.len() - 2);
        let (keep, absorbed) = (tip.min(nearest), tip.max(nearest));
        let (Some(a), Some(b)) = (nodes[keep].take(), nodes[absorbed].take()) else {
            break;
        };
        let size = a.size + b.size;
        let (wa, wb) = (a.size as f64, b.size as f64);
        let centroid = a
            .centroid
            .iter()
            .zip(&b.centroid)
            .map(|(x, y)| (x * wa + y * wb) / (wa + wb))
            .collect();
        nodes[keep] = Some(Node { centroid, size });
        active -= 1;

        merges.push(Merge {
            left: keep,
            right: absorbed,
            distance,
            size,
        });
    }

    merges
}

/// Cuts a dendrogram at `threshold`.
///
/// Every merge with distance strictly below `threshold` is applied; the
/// resulting groups are labelled `0..k` in order of their lowest point
/// index.
#[must_use]
pub fn cut(merges: &[Merge], n: usize, threshold: f64) -> Vec<u32> {
    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    let mut parent: Vec<usize> = (0..n).collect();
    for merge in merges.iter().filter(|m| m.distance < threshold) {
        let a = find(&mut parent, merge.left);
        let b = find(&mut parent, merge.right);
        if a != b {
            parent[a.max(b)] = a.min(b);
        }
    }

    let mut labels = vec![0_u32; n];
    let mut root_labels: Vec<Option<u32>> = vec![None; n];
    let mut next = 0_u32;
    for (i, label) in labels.iter_mut().enumerate() {
        let root = find(&mut parent, i);
        *label = *root_labels[root].get_or_insert_with(|| {
            let assigned = next;
            next += 1;
            assigned
        });
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singleton_merge_distance_is_euclidean() {
        let merges = ward_linkage(&[vec![0.0, 0.0], vec![3.0, 4.0]]);
        assert_eq!(merges.len(), 1);
        assert!((merges[0].distance - 5.0).abs() < 1e-12);
        assert_eq!(merges[0].size, 2);
    }

    #[test]
    fn builds_full_dendrogram() {
        let points: Vec<Vec<f64>> = (0..7).map(|i| vec![f64::from(i * i)]).collect();
        let merges = ward_linkage(&points);
        assert_eq!(merges.len(), 6);
        assert_eq!(merges.iter().map(|m| m.size).max(), Some(7));
    }

    #[test]
    fn merges_closest_pair_first_in_height() {
        let merges = ward_linkage(&[vec![0.0], vec![0.05], vec![1.0]]);
        let lowest = merges
            .iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
            .unwrap();
        assert_eq!((lowest.left, lowest.right), (0, 1));
        assert!((lowest.distance - 0.05).abs() < 1e-12);
    }

    #[test]
    fn ward_height_grows_with_cluster_size() {
        // {0, 0.05} merged, then joined with 1.0:
        // sqrt(2·2·1/3)·|0.025 − 1.0|
        let merges = ward_linkage(&[vec![0.0], vec![0.05], vec![1.0]]);
        let top = merges
            .iter()
            .max_by(|a, b| a.distance.total_cmp(&b.distance))
            .unwrap();
        let expected = (4.0_f64 / 3.0).sqrt() * 0.975;
        assert!((top.distance - expected).abs() < 1e-12);
    }

    #[test]
    fn cut_never_joins_points_beyond_threshold() {
        let points = vec![vec![0.0], vec![0.09], vec![0.2], vec![0.31]];
        let merges = ward_linkage(&points);
        let labels = cut(&merges, points.len(), 0.1);
        assert_eq!(labels[0], labels[1]);
        assert_ne!(labels[1], labels[2]);
        assert_ne!(labels[2], labels[3]);
    }

    #[test]
    fn cut_at_zero_keeps_every_point_apart() {
        let points = vec![vec![0.0], vec![1.0], vec![2.0]];
        let merges = ward_linkage(&points);
        assert_eq!(cut(&merges, 3, 0.0), [0, 1, 2]);
    }

    #[test]
    fn cut_above_root_joins_everything() {
        let points = vec![vec![0.0], vec![1.0], vec![2.0]];
        let merges = ward_linkage(&points);
        assert_eq!(cut(&merges, 3, f64::INFINITY), [0, 0, 0]);
    }
}
