//! Result merging for federated search
//!
//! The merger is a pure function over the unioned candidates of every source:
//! 1. Deduplicate near-identical content, keeping the best-scored copy
//! 2. Boost results from under-represented sources
//! 3. Normalize scores into [0, 1] by the maximum
//! 4. Attach relationships
//! 5. Sort by score, then document id
//! 6. Slice the requested page

pub mod deduplication;
pub mod diversity;

pub use deduplication::deduplicate;
pub use diversity::apply_diversity_boost;

use crate::config::MergeConfig;
use crate::relations::{Relationship, RelationshipMap};
use crate::retrieval::{compare_scored, Document, Metadata};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// One source's result entering the merge
#[derive(Debug, Clone)]
pub struct MergeCandidate {
    pub source_id: String,
    pub document: Arc<Document>,
    pub score: f32,
}

/// Externally visible result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub document_id: String,
    /// Normalized relevance in [0, 1]
    pub score: f32,
    pub source_id: String,
    pub content: String,
    pub metadata: Metadata,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

/// One page of merged results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedPage {
    pub items: Vec<SearchResultItem>,
    /// Deduplicated results before slicing
    pub total_count: usize,
    pub has_more: bool,
}

/// Scale scores by the maximum so the best result scores 1.0.
///
/// Negative and NaN scores are treated as 0. An all-zero set stays at 0.
pub fn normalize_scores(mut candidates: Vec<MergeCandidate>) -> Vec<MergeCandidate> {
    for candidate in &mut candidates {
        if !(candidate.score > 0.0) {
            candidate.score = 0.0;
        }
    }

    let max = candidates
        .iter()
        .map(|c| c.score)
        .fold(0.0_f32, f32::max);

    for candidate in &mut candidates {
        candidate.score = if max > 0.0 && max.is_finite() {
            (candidate.score / max).clamp(0.0, 1.0)
        } else if max.is_infinite() && candidate.score.is_infinite() {
            1.0
        } else {
            0.0
        };
    }

    candidates
}

/// Merges federated candidates into a paginated, annotated result page
#[derive(Debug, Clone)]
pub struct ResultMerger {
    config: MergeConfig,
}

impl ResultMerger {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Run the merge pipeline and return the page at `offset..offset + limit`
    pub fn merge(
        &self,
        candidates: Vec<MergeCandidate>,
        relationships: &RelationshipMap,
        offset: usize,
        limit: usize,
    ) -> MergedPage {
        let unioned = candidates.len();

        // Step 1: Deduplicate
        let deduped = deduplicate(
            candidates,
            self.config.dedup_threshold,
            self.config.shingle_size,
        );

        // Step 2: Diversity boost
        let boosted = apply_diversity_boost(deduped, self.config.diversity_boost);

        // Step 3: Normalize, after boosting
        let mut normalized = normalize_scores(boosted);

        // Step 5: Sort; source id settles equal ids from different sources
        normalized.sort_by(|a, b| {
            compare_scored(a.score, &a.document.id, b.score, &b.document.id)
                .then_with(|| a.source_id.cmp(&b.source_id))
        });

        let total_count = normalized.len();
        let end = offset.saturating_add(limit);
        let has_more = end < total_count;

        debug!(
            "Merged {} candidates into {} results (page {}..{}, has_more={})",
            unioned, total_count, offset, end, has_more
        );

        let survivors: HashSet<&str> = normalized
            .iter()
            .map(|c| c.document.id.as_str())
            .collect();

        // Step 4 + 6: Attach relationships to the page being returned
        let items = normalized
            .iter()
            .skip(offset)
            .take(limit)
            .map(|candidate| {
                let relationships = relationships
                    .get(&candidate.document.id)
                    .map(|edges| {
                        edges
                            .iter()
                            .filter(|edge| survivors.contains(edge.target_id.as_str()))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();

                SearchResultItem {
                    document_id: candidate.document.id.clone(),
                    score: candidate.score,
                    source_id: candidate.source_id.clone(),
                    content: candidate.document.content.clone(),
                    metadata: candidate.document.metadata.clone(),
                    relationships,
                }
            })
            .collect();

        MergedPage {
            items,
            total_count,
            has_more,
        }
    }
}
