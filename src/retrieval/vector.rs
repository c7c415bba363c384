//! Exact cosine-similarity ranking over document embeddings
use super::{rank_descending, Document, ScoredResult};
use crate::error::{Result, TributaryError};
use std::sync::Arc;
use tracing::debug;

pub(crate) fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity in [-1, 1].
///
/// Returns `None` when the dimensions differ or either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let norm_a = magnitude(a);
    let norm_b = magnitude(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    Some((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

/// Brute-force vector scorer
#[derive(Debug, Clone)]
pub struct VectorScorer {
    default_limit: usize,
}

impl Default for VectorScorer {
    fn default() -> Self {
        Self { default_limit: 10 }
    }
}

impl VectorScorer {
    /// `default_limit` caps results when the caller passes no limit
    pub fn new(default_limit: usize) -> Self {
        Self {
            default_limit: default_limit.max(1),
        }
    }

    /// Rank `candidates` by similarity to `query`, best first.
    ///
    /// Documents without a vector, with a different dimension or with a
    /// zero vector are skipped rather than failing the query.
    pub fn rank(
        &self,
        query: &[f32],
        candidates: &[Arc<Document>],
        limit: Option<usize>,
    ) -> Result<Vec<ScoredResult>> {
        if query.is_empty() {
            return Err(TributaryError::EmptyVector);
        }
        if magnitude(query) == 0.0 {
            return Err(TributaryError::ZeroMagnitude);
        }

        let mut missing = 0usize;
        let mut mismatched = 0usize;
        let mut degenerate = 0usize;
        let mut scored = Vec::with_capacity(candidates.len());

        for document in candidates {
            let Some(vector) = document.vector.as_deref() else {
                missing += 1;
                continue;
            };

            if vector.len() != query.len() {
                mismatched += 1;
                continue;
            }

            match cosine_similarity(query, vector) {
                Some(similarity) if !similarity.is_nan() => {
                    scored.push((document.id.clone(), similarity))
                }
                _ => degenerate += 1,
            }
        }

        if missing + mismatched + degenerate > 0 {
            debug!(
                "Vector scorer skipped {} documents (missing={}, dimension_mismatch={}, zero_or_nan={})",
                missing + mismatched + degenerate,
                missing,
                mismatched,
                degenerate
            );
        }

        let mut ranked = rank_descending(scored);
        ranked.truncate(limit.unwrap_or(self.default_limit));
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, vector: Vec<f32>) -> Arc<Document> {
        Arc::new(Document::new(id, id).with_vector(vector))
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap() - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap() + 1.0).abs() < 1e-6);
        // Magnitude does not matter
        assert!((cosine_similarity(&[2.0, 2.0], &[5.0, 5.0]).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_undefined_cases() {
        assert!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]).is_none());
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).is_none());
        assert!(cosine_similarity(&[], &[]).is_none());
    }

    #[test]
    fn test_query_vector_errors() {
        let scorer = VectorScorer::default();
        assert!(matches!(
            scorer.rank(&[], &[], None),
            Err(TributaryError::EmptyVector)
        ));
        assert!(matches!(
            scorer.rank(&[0.0, 0.0], &[], None),
            Err(TributaryError::ZeroMagnitude)
        ));
    }

    #[test]
    fn test_dimension_mismatch_is_skipped() {
        let scorer = VectorScorer::default();
        let candidates = vec![
            doc("ok", vec![1.0, 0.0, 0.0]),
            doc("short", vec![1.0, 0.0]),
            Arc::new(Document::new("none", "no vector")),
        ];

        let results = scorer.rank(&[1.0, 0.0, 0.0], &candidates, None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_id, "ok");
    }

    #[test]
    fn test_ranking_and_tie_break() {
        let scorer = VectorScorer::default();
        let candidates = vec![
            doc("b", vec![1.0, 1.0]),
            doc("a", vec![1.0, 1.0]),
            doc("c", vec![1.0, 0.0]),
        ];

        let results = scorer.rank(&[1.0, 1.0], &candidates, None).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.document_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(results[0].rank, 1);
    }

    #[test]
    fn test_default_limit_applies() {
        let scorer = VectorScorer::new(2);
        let candidates: Vec<_> = (0..5).map(|i| doc(&format!("d{}", i), vec![1.0, i as f32])).collect();

        assert_eq!(scorer.rank(&[1.0, 0.0], &candidates, None).unwrap().len(), 2);
        assert_eq!(scorer.rank(&[1.0, 0.0], &candidates, Some(4)).unwrap().len(), 4);
    }
}
