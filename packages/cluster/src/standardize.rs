//! Column-wise standardization (zero mean, unit variance).

use crate::ClusterError;

/// Standardizes each column of `points` to zero mean and unit variance.
///
/// Uses the population variance. A constant column maps to all zeros.
///
/// # Errors
///
/// Returns [`ClusterError`] if the rows are empty, ragged, or contain a
/// non-finite value.
#[allow(clippy::cast_precision_loss)]
pub fn standardize(points: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ClusterError> {
    let Some(first) = points.first() else {
        return Ok(Vec::new());
    };
    let dims = first.len();
    if dims == 0 {
        return Err(ClusterError::NoFeatures);
    }

    for (row, point) in points.iter().enumerate() {
        if point.len() != dims {
            return Err(ClusterError::Ragged {
                row,
                expected: dims,
                actual: point.len(),
            });
        }
        if let Some(column) = point.iter().position(|v| !v.is_finite()) {
            return Err(ClusterError::NonFinite { row, column });
        }
    }

    let n = points.len() as f64;
    let mut means = vec![0.0; dims];
    for point in points {
        for (mean, v) in means.iter_mut().zip(point) {
            *mean += v / n;
        }
    }

    let mut scales = vec![0.0; dims];
    for point in points {
        for ((scale, v), mean) in scales.iter_mut().zip(point).zip(&means) {
            *scale += (v - mean).powi(2) / n;
        }
    }
    for scale in &mut scales {
        *scale = scale.sqrt();
        if *scale == 0.0 {
            *scale = 1.0;
        }
    }

    Ok(points
        .iter()
        .map(|point| {
            point
                .iter()
                .zip(&means)
                .zip(&scales)
                .map(|((v, mean), scale)| (v - mean) / scale)
                .collect()
        })
        .collect())
}
