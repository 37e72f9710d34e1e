//! Vector similarity metrics.

/// Cosine similarity in `[-1, 1]`.
///
/// Zero-norm handling: two zero vectors are identical (1.0); a zero vector
/// against a non-zero one is orthogonal (0.0). Vectors of different length
/// are compared over their common prefix.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let a_zero = norm_a <= f64::EPSILON;
    let b_zero = norm_b <= f64::EPSILON;
    match (a_zero, b_zero) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        (false, false) => (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0),
    }
}

/// Distances below this are rounding noise and read as 0.
pub const DISTANCE_EPSILON: f64 = 1e-9;

/// Cosine distance mapped to `[0, 1]`: `clamp(1 - cosine, 0, 1)`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let d = (1.0 - cosine_similarity(a, b)).clamp(0.0, 1.0);
    if d < DISTANCE_EPSILON {
        0.0
    } else {
        d
    }
}

/// Scale a vector to unit L2 norm in place. Zero vectors are left as-is.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f64 = v.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt();
    if norm > 1e-10 {
        for x in v.iter_mut() {
            *x = (f64::from(*x) / norm) as f32;
        }
    }
}
