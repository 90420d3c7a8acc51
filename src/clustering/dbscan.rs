//! Density-based clustering over cosine distance.
//!
//! A classic DBSCAN expansion loop. Density-based grouping is used instead
//! of a centroid-based algorithm because the number of topics is unknown in
//! advance, low-density points must be labeled as outliers rather than
//! force-assigned, and clusters of unequal size and density must coexist.

/// Label for points not yet visited.
const UNDEFINED: i32 = 0;
/// Label for points the algorithm could not assign to any cluster.
pub(crate) const NOISE: i32 = -1;

/// Runs DBSCAN over the given embeddings using cosine distance.
///
/// # Parameters
///
/// - `embeddings`: the data points
/// - `epsilon`: maximum cosine distance (1 - cosine similarity) for neighbors
/// - `min_samples`: minimum neighborhood size for a core point
///
/// # Returns
///
/// One label per point: `-1` marks noise, positive labels (1, 2, ...)
/// identify clusters.
pub(crate) fn dbscan(embeddings: &[Vec<f32>], epsilon: f32, min_samples: usize) -> Vec<i32> {
    let n = embeddings.len();
    if n == 0 {
        return Vec::new();
    }

    let mut labels = vec![UNDEFINED; n];
    let mut cluster_id: i32 = 0;

    for i in 0..n {
        if labels[i] != UNDEFINED {
            continue;
        }

        let neighbors = range_query(embeddings, i, epsilon);
        if neighbors.len() < min_samples {
            labels[i] = NOISE;
            continue;
        }

        cluster_id += 1;
        labels[i] = cluster_id;

        let mut seeds: Vec<usize> = neighbors.into_iter().filter(|&j| j != i).collect();
        let mut cursor = 0;
        while cursor < seeds.len() {
            let q = seeds[cursor];
            cursor += 1;

            if labels[q] == NOISE {
                labels[q] = cluster_id;
            }
            if labels[q] != UNDEFINED {
                continue;
            }
            labels[q] = cluster_id;

            let q_neighbors = range_query(embeddings, q, epsilon);
            if q_neighbors.len() >= min_samples {
                seeds.extend(q_neighbors);
            }
        }
    }

    labels
}

/// Returns indices of all points within `epsilon` cosine distance of point `idx`.
fn range_query(embeddings: &[Vec<f32>], idx: usize, epsilon: f32) -> Vec<usize> {
    let q = &embeddings[idx];
    embeddings
        .iter()
        .enumerate()
        .filter(|(_, v)| cosine_distance(q, v) <= epsilon)
        .map(|(i, _)| i)
        .collect()
}

/// Cosine distance: 1 - cosine similarity.
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Cosine similarity between two vectors.
///
/// Uses f64 intermediates so accumulated error stays negligible at typical
/// embedding dimensionalities (hundreds of components).
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot: f64 = 0.0;
    let mut norm_a: f64 = 0.0;
    let mut norm_b: f64 = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    (dot / denom) as f32
}
