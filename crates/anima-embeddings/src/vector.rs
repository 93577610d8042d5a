//! Small vector math shared by the gateway and the consolidator.

/// L2-normalise in place. Returns false for a zero vector, which cannot
/// be normalised.
pub fn l2_normalize(v: &mut [f32]) -> bool {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= f32::EPSILON {
        return false;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    true
}

/// Cosine similarity between two vectors. Zero when either has no norm
/// or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_vector_cannot_normalise() {
        let mut v = vec![0.0f32; 8];
        assert!(!l2_normalize(&mut v));
    }

    #[test]
    fn normalised_vector_has_unit_norm() {
        let mut v = vec![3.0, 4.0];
        assert!(l2_normalize(&mut v));
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = vec![0.2f32, 0.5, -0.1, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mismatched_lengths_yield_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
    }

    proptest! {
        #[test]
        fn similarity_is_bounded(
            a in proptest::collection::vec(-10.0f32..10.0, 16),
            b in proptest::collection::vec(-10.0f32..10.0, 16),
        ) {
            let sim = cosine_similarity(&a, &b);
            prop_assert!((-1.0 - 1e-9..=1.0 + 1e-9).contains(&sim));
        }
    }
}
