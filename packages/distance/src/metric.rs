//! Eligibility gate, windowing, and the recency-weighted distance.

use similarity_timeline::{Timeline, TimelineRecord};

use crate::{DistanceFeature, DistanceParams, FeatureDistances};

/// Smallest weight any day in the window receives.
const MIN_WEIGHT: f64 = 0.1;

/// Decides whether focal timeline `a` should be compared with candidate `b`.
///
/// Pairs are skipped when either timeline is empty, or when `b` is more than
/// `max_length_lag` days shorter than `a` (its data collection started much
/// later). The check is deliberately one-directional.
#[must_use]
pub const fn should_compare(a_len: usize, b_len: usize, max_length_lag: usize) -> bool {
    if a_len == 0 || b_len == 0 {
        return false;
    }
    b_len + max_length_lag >= a_len
}

/// Truncates both series to their common length, then keeps the trailing
/// `window_days` days of each. A window of `0` keeps the whole overlap.
#[must_use]
pub fn window<'a>(
    a: &'a [TimelineRecord],
    b: &'a [TimelineRecord],
    window_days: usize,
) -> (&'a [TimelineRecord], &'a [TimelineRecord]) {
    let length = a.len().min(b.len());
    let start = if window_days == 0 {
        0
    } else {
        length.saturating_sub(window_days)
    };
    (&a[start..length], &b[start..length])
}

/// Recency-weighted mean absolute difference of one feature.
///
/// Day `i` (1-based) of an `L`-day window has weight `max(0.1, i / L)`.
/// Returns `None` if the windows are empty or differ in length, or if the
/// feature is missing on either side.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn weighted_distance(
    a: &[TimelineRecord],
    b: &[TimelineRecord],
    feature: DistanceFeature,
) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let length = a.len() as f64;

    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for (i, (ra, rb)) in a.iter().zip(b).enumerate() {
        let diff = (feature.value(ra)? - feature.value(rb)?).abs();
        let weight = ((i + 1) as f64 / length).max(MIN_WEIGHT);
        weighted_sum += weight * diff;
        weight_total += weight;
    }

    Some(weighted_sum / weight_total)
}

/// Computes all four feature distances between two timelines.
///
/// Callers gate with [`should_compare`] first; for empty timelines the
/// count distances degrade to `0`.
#[must_use]
pub fn distances(a: &Timeline, b: &Timeline, params: &DistanceParams) -> FeatureDistances {
    let (wa, wb) = window(a.records(), b.records(), params.window_days);
    FeatureDistances {
        cases: weighted_distance(wa, wb, DistanceFeature::Cases).unwrap_or_default(),
        deaths: weighted_distance(wa, wb, DistanceFeature::Deaths).unwrap_or_default(),
        cases_per_100k: weighted_distance(wa, wb, DistanceFeature::CasesPer100k),
        deaths_per_100k: weighted_distance(wa, wb, DistanceFeature::DeathsPer100k),
    }
}
