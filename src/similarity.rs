/// Cosine similarity between two vectors.
///
/// Vectors of different length, and any comparison involving a zero vector,
/// score `0.0` instead of failing. Ranking passes rely on this to skip
/// vectors left over from an older embedding dimension. The result is
/// clamped to `[-1, 1]`.
///
/// # Examples
///
/// ```
/// use kbsearch::similarity::cosine_similarity;
///
/// assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
/// assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
/// assert!((cosine_similarity(&[3.0, 4.0], &[6.0, 8.0]) - 1.0).abs() < 1e-6);
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a.iter().zip(b).fold(
        (0.0f32, 0.0f32, 0.0f32),
        |(dot, na, nb), (x, y)| (dot + x * y, na + x * x, nb + y * y),
    );

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn identical_vectors() {
        let v = [0.2, -0.4, 0.9];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn opposite_vectors() {
        let score = cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]);
        assert!((score + 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors() {
        assert_eq!(cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]), 0.0);
    }

    #[test]
    fn zero_vector_scores_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 1.0], &[0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn mismatched_lengths_score_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn magnitude_is_ignored() {
        let score = cosine_similarity(&[1.0, 1.0], &[100.0, 100.0]);
        assert!((score - 1.0).abs() < 1e-6);
    }

    fn vector(len: usize) -> impl Strategy<Value = Vec<f32>> {
        prop::collection::vec(-100.0f32..100.0, len)
    }

    proptest! {
        #[test]
        fn bounded(pair in (1usize..64).prop_flat_map(|n| (vector(n), vector(n)))) {
            let score = cosine_similarity(&pair.0, &pair.1);
            prop_assert!((-1.0..=1.0).contains(&score));
        }

        #[test]
        fn symmetric(pair in (1usize..64).prop_flat_map(|n| (vector(n), vector(n)))) {
            prop_assert_eq!(
                cosine_similarity(&pair.0, &pair.1),
                cosine_similarity(&pair.1, &pair.0)
            );
        }

        #[test]
        fn self_similarity_is_one(v in vector(32)) {
            prop_assume!(v.iter().any(|&x| x.abs() > 1e-3));
            prop_assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-4);
        }

        #[test]
        fn mismatch_is_zero(a in vector(8), b in vector(9)) {
            prop_assert_eq!(cosine_similarity(&a, &b), 0.0);
        }
    }
}
