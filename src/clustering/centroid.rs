//! Centroid computation.
//!
//! Pure functions with no side effects, used both by labeling
//! (nearest-to-centroid representative selection) and evolution tracking
//! (centroid similarity scoring).

/// Computes the element-wise mean of the given vectors.
///
/// Returns an empty vector when `vectors` is empty. Recomputing a centroid
/// from the same members always yields the same result (within floating
/// tolerance), which persistence tests rely on.
#[must_use]
pub fn centroid(vectors: &[&[f32]]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };

    let mut sums = vec![0.0f64; first.len()];
    for vector in vectors {
        for (sum, &x) in sums.iter_mut().zip(vector.iter()) {
            *sum += f64::from(x);
        }
    }

    let n = vectors.len() as f64;
    #[allow(clippy::cast_possible_truncation)]
    sums.into_iter().map(|sum| (sum / n) as f32).collect()
}
