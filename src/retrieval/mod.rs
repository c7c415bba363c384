//! Per-source hybrid retrieval
//!
//! Lexical (BM25) and vector (cosine) scorers rank the documents of a single
//! source; Reciprocal Rank Fusion combines the two rankings and the hybrid
//! searcher applies filters and cutoffs on top.

mod document;
mod fusion;
mod hybrid;
mod keyword_index;
mod lexical;
mod vector;

pub use document::{keys, Document, DocumentFilter, DocumentStore, InMemoryStore, Metadata};
pub use fusion::{reciprocal_rank_fusion, FusionConfig};
pub use hybrid::HybridSearcher;
pub use keyword_index::KeywordIndex;
pub use lexical::{Bm25Params, InvertedIndex, LexicalScorer, TextIndex};
pub use vector::{cosine_similarity, VectorScorer};

use crate::error::{Result, TributaryError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

/// Input to a single retrieval operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Natural-language or code query
    pub query_text: String,

    /// Query embedding; lexical-only fusion when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_vector: Option<Vec<f32>>,

    /// Exact-match metadata constraints
    #[serde(default)]
    pub filters: DocumentFilter,

    /// Pagination cursor
    #[serde(default)]
    pub offset: usize,

    /// Page size, defaulted and bounded by the federation config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    /// Fusion weight in [0, 1]: 0 = lexical only, 1 = vector only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f32>,

    /// Results scoring below this are dropped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,
}

impl SearchRequest {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            query_vector: None,
            filters: DocumentFilter::default(),
            offset: 0,
            limit: None,
            alpha: None,
            min_score: None,
        }
    }

    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.query_vector = Some(vector);
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters = self.filters.with(key, value);
        self
    }

    pub fn with_page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = Some(alpha);
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// Whether there is query text to run the lexical scorer with
    pub fn has_text(&self) -> bool {
        !self.query_text.trim().is_empty()
    }

    /// Reject requests with nothing to search for or out-of-range parameters
    pub fn validate(&self) -> Result<()> {
        if !self.has_text() && self.query_vector.is_none() {
            return Err(TributaryError::EmptyQuery);
        }

        if let Some(vector) = &self.query_vector {
            if vector.is_empty() {
                return Err(TributaryError::EmptyVector);
            }
            if vector.iter().any(|x| !x.is_finite()) {
                return Err(TributaryError::InvalidParameter {
                    name: "query_vector".to_string(),
                    message: "components must be finite".to_string(),
                });
            }
            // Same test the vector scorer applies, so tiny components that
            // underflow when squared are rejected here
            if vector::magnitude(vector) == 0.0 {
                return Err(TributaryError::ZeroMagnitude);
            }
        }

        if let Some(alpha) = self.alpha {
            if !(0.0..=1.0).contains(&alpha) {
                return Err(TributaryError::InvalidParameter {
                    name: "alpha".to_string(),
                    message: format!("must be in [0.0, 1.0], got {}", alpha),
                });
            }
        }

        if let Some(min_score) = self.min_score {
            if !min_score.is_finite() {
                return Err(TributaryError::InvalidParameter {
                    name: "min_score".to_string(),
                    message: format!("must be finite, got {}", min_score),
                });
            }
        }

        Ok(())
    }

    /// Page size after defaulting; zero or above `max` is rejected
    pub fn resolved_limit(&self, default: usize, max: usize) -> Result<usize> {
        let limit = self.limit.unwrap_or(default);
        if limit == 0 || limit > max {
            return Err(TributaryError::InvalidPagination {
                offset: self.offset as i64,
                limit: limit as i64,
                max,
            });
        }
        Ok(limit)
    }

    /// Identity of this request for caching.
    ///
    /// Every field that changes the response participates, including
    /// `offset` and `limit`: two pages of the same query are different
    /// responses.
    pub fn cache_key(&self) -> String {
        let mut hasher = blake3::Hasher::new();

        hasher.update(b"q:");
        hasher.update(&(self.query_text.len() as u64).to_le_bytes());
        hasher.update(self.query_text.as_bytes());

        hasher.update(b"v:");
        match &self.query_vector {
            Some(vector) => {
                hasher.update(&(vector.len() as u64).to_le_bytes());
                for x in vector {
                    hasher.update(&x.to_bits().to_le_bytes());
                }
            }
            None => {
                hasher.update(&[0xff]);
            }
        }

        hasher.update(b"f:");
        for (key, value) in &self.filters.constraints {
            hasher.update(&(key.len() as u64).to_le_bytes());
            hasher.update(key.as_bytes());
            hasher.update(&(value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        }

        hasher.update(b"p:");
        hasher.update(&(self.offset as u64).to_le_bytes());
        hasher.update(&self.limit.map(|l| l as u64 + 1).unwrap_or(0).to_le_bytes());

        hasher.update(b"a:");
        hasher.update(&self.alpha.map(f32::to_bits).unwrap_or(u32::MAX).to_le_bytes());
        hasher.update(b"m:");
        hasher.update(&self.min_score.map(f32::to_bits).unwrap_or(u32::MAX).to_le_bytes());

        hasher.finalize().to_hex().to_string()
    }
}

/// Validate raw pagination values as they arrive from a caller
pub fn checked_page(offset: i64, limit: i64, max: usize) -> Result<(usize, usize)> {
    if offset < 0 || limit <= 0 || limit as u64 > max as u64 {
        return Err(TributaryError::InvalidPagination { offset, limit, max });
    }
    Ok((offset as usize, limit as usize))
}

/// One entry of a single-source ranked list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub document_id: String,
    /// 1-based position in the list
    pub rank: usize,
    pub raw_score: f32,
}

/// A ranked result hydrated with the document it refers to
#[derive(Debug, Clone)]
pub struct SourceHit {
    pub document: Arc<Document>,
    /// 1-based position in the source's fused list
    pub rank: usize,
    /// Fused relevance in [0, 1]
    pub score: f32,
}

/// Sort `(id, score)` pairs by score descending then id ascending, and
/// number them from 1.
pub(crate) fn rank_descending(mut pairs: Vec<(String, f32)>) -> Vec<ScoredResult> {
    pairs.sort_by(|a, b| compare_scored(a.1, &a.0, b.1, &b.0));
    pairs
        .into_iter()
        .enumerate()
        .map(|(idx, (document_id, raw_score))| ScoredResult {
            document_id,
            rank: idx + 1,
            raw_score,
        })
        .collect()
}

/// Score descending, id ascending. NaN sorts last.
pub(crate) fn compare_scored(a_score: f32, a_id: &str, b_score: f32, b_id: &str) -> Ordering {
    let a_key = if a_score.is_nan() { f32::NEG_INFINITY } else { a_score };
    let b_key = if b_score.is_nan() { f32::NEG_INFINITY } else { b_score };
    b_key.total_cmp(&a_key).then_with(|| a_id.cmp(b_id))
}
