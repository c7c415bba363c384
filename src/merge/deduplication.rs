//! Near-duplicate removal across the federated result union

use super::MergeCandidate;
use crate::retrieval::compare_scored;
use crate::text::{jaccard, shingles};
use ahash::AHashSet;
use std::collections::HashSet;

/// Deduplicate candidates by content similarity, keeping the highest-scored
/// member of each group
///
/// Candidates are visited best first; one is discarded when it shares a
/// document id with an already kept candidate or its content similarity to
/// any kept candidate reaches `threshold`. Kept candidates are therefore
/// pairwise below the threshold, and a second pass removes nothing.
///
/// # Returns
/// Surviving candidates in descending score order
pub fn deduplicate(
    mut candidates: Vec<MergeCandidate>,
    threshold: f32,
    shingle_size: usize,
) -> Vec<MergeCandidate> {
    candidates.sort_by(|a, b| {
        compare_scored(a.score, &a.document.id, b.score, &b.document.id)
            .then_with(|| a.source_id.cmp(&b.source_id))
    });

    let mut kept: Vec<MergeCandidate> = Vec::with_capacity(candidates.len());
    let mut kept_shingles: Vec<AHashSet<u64>> = Vec::with_capacity(candidates.len());
    let mut kept_ids: HashSet<String> = HashSet::new();

    for candidate in candidates {
        if kept_ids.contains(&candidate.document.id) {
            continue;
        }

        let candidate_shingles = shingles(&candidate.document.content, shingle_size);
        let duplicate = kept.iter().zip(&kept_shingles).any(|(existing, existing_shingles)| {
            existing.document.content == candidate.document.content
                || jaccard(existing_shingles, &candidate_shingles) >= threshold
        });

        if duplicate {
            continue;
        }

        kept_ids.insert(candidate.document.id.clone());
        kept_shingles.push(candidate_shingles);
        kept.push(candidate);
    }

    kept
}
