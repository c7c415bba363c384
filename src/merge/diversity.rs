//! Source diversity boosting

use super::MergeCandidate;
use std::collections::BTreeMap;
use tracing::debug;

/// Raise the scores of results from under-represented sources.
///
/// A source is under-represented when it contributes fewer results than the
/// per-source average of the current set; each of its results gains `boost`.
/// Scores may leave [0, 1] here and must be normalized afterwards.
pub fn apply_diversity_boost(mut candidates: Vec<MergeCandidate>, boost: f32) -> Vec<MergeCandidate> {
    if candidates.is_empty() || boost <= 0.0 {
        return candidates;
    }

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for candidate in &candidates {
        *counts.entry(candidate.source_id.as_str()).or_insert(0) += 1;
    }

    if counts.len() < 2 {
        return candidates;
    }

    let average = candidates.len() as f32 / counts.len() as f32;
    let boosted: Vec<String> = counts
        .iter()
        .filter(|(_, &count)| (count as f32) < average)
        .map(|(source, _)| source.to_string())
        .collect();

    if boosted.is_empty() {
        return candidates;
    }

    debug!(
        "Diversity boost {} for sources {:?} (average {:.2} results per source)",
        boost, boosted, average
    );

    for candidate in &mut candidates {
        if boosted.contains(&candidate.source_id) {
            candidate.score += boost;
        }
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::Document;
    use std::sync::Arc;

    fn candidate(source: &str, id: &str, score: f32) -> MergeCandidate {
        MergeCandidate {
            source_id: source.to_string(),
            document: Arc::new(Document::new(id, id)),
            score,
        }
    }

    fn score_of(candidates: &[MergeCandidate], id: &str) -> f32 {
        candidates
            .iter()
            .find(|c| c.document.id == id)
            .map(|c| c.score)
            .unwrap()
    }

    #[test]
    fn test_minority_source_is_boosted() {
        let candidates = vec![
            candidate("code", "c1", 0.5),
            candidate("code", "c2", 0.5),
            candidate("code", "c3", 0.5),
            candidate("chat", "m1", 0.5),
        ];

        let boosted = apply_diversity_boost(candidates, 0.05);

        assert!((score_of(&boosted, "m1") - 0.55).abs() < 1e-6);
        assert!((score_of(&boosted, "c1") - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_balanced_sources_unchanged() {
        let candidates = vec![
            candidate("a", "a1", 0.4),
            candidate("a", "a2", 0.3),
            candidate("b", "b1", 0.2),
            candidate("b", "b2", 0.1),
        ];
        let boosted = apply_diversity_boost(candidates.clone(), 0.05);
        for (before, after) in candidates.iter().zip(&boosted) {
            assert_eq!(before.score, after.score);
        }
    }

    #[test]
    fn test_single_source_unchanged() {
        let candidates = vec![candidate("only", "x", 0.9), candidate("only", "y", 0.8)];
        let boosted = apply_diversity_boost(candidates, 0.05);
        assert_eq!(score_of(&boosted, "x"), 0.9);
    }

    #[test]
    fn test_boost_can_exceed_one() {
        let candidates = vec![
            candidate("big", "b1", 0.2),
            candidate("big", "b2", 0.2),
            candidate("big", "b3", 0.2),
            candidate("small", "s1", 1.0),
        ];
        let boosted = apply_diversity_boost(candidates, 0.05);
        assert!(score_of(&boosted, "s1") > 1.0);
    }
}
