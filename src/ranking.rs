use rayon::prelude::*;

use crate::{
    error::{Error, Result},
    similarity::cosine_similarity,
};

/// Default minimum similarity for a candidate to be returned.
pub const DEFAULT_THRESHOLD: f32 = 0.7;

/// Default maximum number of ranked results.
pub const DEFAULT_LIMIT: usize = 10;

/// A document offered to [`rank`] together with its stored vector.
#[derive(Debug, Clone)]
pub struct Candidate<P> {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: P,
}

/// A ranked document with its cosine similarity to the query.
///
/// The candidate's vector is not carried over.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedDocument<P> {
    pub id: String,
    pub payload: P,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankParams {
    /// Minimum score, inclusive. Not clamped to `[0, 1]`.
    pub threshold: f32,
    /// Maximum number of results.
    pub limit: usize,
}

impl Default for RankParams {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl RankParams {
    /// Build params from a caller-supplied signed limit. Negative limits
    /// become zero, which yields an empty ranking.
    pub fn from_signed(threshold: f32, limit: i64) -> Self {
        Self {
            threshold,
            limit: usize::try_from(limit.max(0)).unwrap_or(usize::MAX),
        }
    }
}

/// Rank candidates by cosine similarity to `query`.
///
/// 1. Score every candidate against the query (in parallel)
/// 2. Keep candidates scoring at or above the threshold
/// 3. Sort by score descending; ties keep their input order
/// 4. Truncate to the limit
///
/// Only a NaN threshold is rejected. Candidates whose vector length differs
/// from the query score zero and fall out under any positive threshold.
///
/// # Examples
///
/// ```
/// use kbsearch::ranking::{rank, Candidate, RankParams};
///
/// let candidates = vec![
///     Candidate { id: "a".into(), vector: vec![1.0, 0.0], payload: () },
///     Candidate { id: "b".into(), vector: vec![0.0, 1.0], payload: () },
/// ];
/// let ranked = rank(&[1.0, 0.0], candidates, RankParams::default()).unwrap();
/// assert_eq!(ranked.len(), 1);
/// assert_eq!(ranked[0].id, "a");
/// ```
pub fn rank<P: Send>(
    query: &[f32],
    candidates: Vec<Candidate<P>>,
    params: RankParams,
) -> Result<Vec<RankedDocument<P>>> {
    if params.threshold.is_nan() {
        return Err(Error::InvalidInput(
            "similarity threshold must be a number".to_string(),
        ));
    }
    if params.limit == 0 || candidates.is_empty() {
        return Ok(Vec::new());
    }

    let mut ranked: Vec<RankedDocument<P>> = candidates
        .into_par_iter()
        .filter_map(|Candidate { id, vector, payload }| {
            let score = cosine_similarity(query, &vector);
            (score >= params.threshold).then_some(RankedDocument {
                id,
                payload,
                score,
            })
        })
        .collect();

    // Stable sort, so equal scores stay in input order.
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(params.limit);

    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    /// A unit vector whose cosine with `[1, 0]` is exactly `score`.
    fn at(score: f32) -> Vec<f32> {
        vec![score, (1.0 - score * score).sqrt()]
    }

    fn candidate(id: &str, vector: Vec<f32>) -> Candidate<String> {
        Candidate {
            id: id.to_string(),
            vector,
            payload: format!("payload-{id}"),
        }
    }

    const QUERY: [f32; 2] = [1.0, 0.0];

    #[test]
    fn threshold_and_order() {
        let candidates = vec![
            candidate("high", at(0.9)),
            candidate("mid", at(0.75)),
            candidate("low", at(0.4)),
        ];

        let ranked = rank(&QUERY, candidates, RankParams::default()).unwrap();

        let ids: Vec<&str> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid"]);
        assert!((ranked[0].score - 0.9).abs() < 1e-5);
        assert!((ranked[1].score - 0.75).abs() < 1e-5);
        assert_eq!(ranked[0].payload, "payload-high");
    }

    #[test]
    fn sorts_unordered_input() {
        let candidates = vec![
            candidate("b", at(0.8)),
            candidate("a", at(0.95)),
            candidate("c", at(0.71)),
        ];
        let ranked = rank(&QUERY, candidates, RankParams::default()).unwrap();
        let ids: Vec<&str> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn threshold_is_inclusive() {
        let candidates = vec![candidate("exact", vec![1.0, 0.0])];
        let params = RankParams {
            threshold: 1.0,
            limit: 10,
        };
        assert_eq!(rank(&QUERY, candidates, params).unwrap().len(), 1);
    }

    #[test]
    fn ties_keep_input_order() {
        let candidates = vec![
            candidate("first", vec![2.0, 0.0]),
            candidate("second", vec![1.0, 0.0]),
            candidate("third", vec![5.0, 0.0]),
        ];
        let ranked = rank(&QUERY, candidates, RankParams::default()).unwrap();
        let ids: Vec<&str> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn respects_limit() {
        let candidates = (0..20)
            .map(|i| candidate(&i.to_string(), at(0.8)))
            .collect();
        let params = RankParams {
            threshold: 0.5,
            limit: 3,
        };
        assert_eq!(rank(&QUERY, candidates, params).unwrap().len(), 3);
    }

    #[test]
    fn empty_candidates() {
        let ranked: Vec<RankedDocument<String>> =
            rank(&QUERY, Vec::new(), RankParams::default()).unwrap();
        assert!(ranked.is_empty());
    }

    #[test]
    fn zero_limit() {
        let params = RankParams {
            threshold: 0.0,
            limit: 0,
        };
        let ranked =
            rank(&QUERY, vec![candidate("a", at(1.0))], params).unwrap();
        assert!(ranked.is_empty());
    }

    #[test]
    fn negative_limit_is_clamped() {
        let params = RankParams::from_signed(0.0, -5);
        assert_eq!(params.limit, 0);
        let ranked =
            rank(&QUERY, vec![candidate("a", at(1.0))], params).unwrap();
        assert!(ranked.is_empty());
    }

    #[test]
    fn threshold_outside_unit_range_is_used_as_given() {
        let params = RankParams {
            threshold: -1.0,
            limit: 10,
        };
        let candidates = vec![candidate("opposite", vec![-1.0, 0.0])];
        let ranked = rank(&QUERY, candidates, params).unwrap();
        assert_eq!(ranked.len(), 1);

        let params = RankParams {
            threshold: 1.5,
            limit: 10,
        };
        let candidates = vec![candidate("same", vec![1.0, 0.0])];
        assert!(rank(&QUERY, candidates, params).unwrap().is_empty());
    }

    #[test]
    fn stale_dimension_vectors_are_skipped() {
        let candidates = vec![
            candidate("current", at(0.9)),
            candidate("stale", vec![1.0, 0.0, 0.0]),
        ];
        let ranked = rank(&QUERY, candidates, RankParams::default()).unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, "current");
    }

    #[test]
    fn nan_threshold_is_rejected() {
        let params = RankParams {
            threshold: f32::NAN,
            limit: 10,
        };
        let err = rank(&QUERY, vec![candidate("a", at(1.0))], params)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    proptest! {
        #[test]
        fn ranking_invariants(
            vectors in prop::collection::vec(
                prop::collection::vec(-1.0f32..1.0, 4),
                0..40,
            ),
            query in prop::collection::vec(-1.0f32..1.0, 4),
            threshold in 0.0f32..1.0,
            limit in 0usize..15,
        ) {
            let candidates: Vec<Candidate<usize>> = vectors
                .iter()
                .enumerate()
                .map(|(i, v)| Candidate {
                    id: i.to_string(),
                    vector: v.clone(),
                    payload: i,
                })
                .collect();

            let params = RankParams { threshold, limit };
            let ranked = rank(&query, candidates, params).unwrap();

            prop_assert!(ranked.len() <= limit);
            for r in &ranked {
                prop_assert!(r.score >= threshold);
            }
            for pair in ranked.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }

            let passing = vectors
                .iter()
                .filter(|v| cosine_similarity(&query, v) >= threshold)
                .count();
            prop_assert_eq!(ranked.len(), passing.min(limit));
        }
    }
}
