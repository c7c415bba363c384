//! BM25 lexical scoring over an inverted index

use super::{rank_descending, Document, ScoredResult};
use crate::error::{Result, TributaryError};
use crate::text::tokenize;
use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Text index collaborator consumed by the lexical scorer.
///
/// Returned pairs need not be sorted; the scorer imposes the deterministic order.
pub trait TextIndex: Send + Sync {
    /// Up to `limit` `(document id, relevance)` pairs matching `query`
    fn search_text(&self, query: &str, limit: usize) -> Result<Vec<(String, f32)>>;

    /// Number of indexed documents
    fn num_docs(&self) -> usize;
}

/// BM25 saturation (`k1`) and length normalization (`b`) parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

#[derive(Debug, Clone, Copy)]
struct Posting {
    doc: u32,
    tf: u32,
}

/// In-memory inverted index with exact BM25 scoring
#[derive(Debug, Default)]
pub struct InvertedIndex {
    params: Bm25Params,
    doc_ids: Vec<String>,
    doc_lens: Vec<u32>,
    positions: AHashMap<String, u32>,
    postings: AHashMap<String, Vec<Posting>>,
    total_len: u64,
}

impl InvertedIndex {
    pub fn new(params: Bm25Params) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    /// Build an index over the given documents
    pub fn from_documents<'a>(
        documents: impl IntoIterator<Item = &'a Document>,
        params: Bm25Params,
    ) -> Self {
        let mut index = Self::new(params);
        for document in documents {
            index.insert(&document.id, &document.content);
        }
        debug!(
            "Built inverted index: {} docs, {} terms",
            index.doc_ids.len(),
            index.postings.len()
        );
        index
    }

    /// Index one document. A repeated id is ignored: re-indexing builds a new index.
    pub fn insert(&mut self, id: &str, content: &str) {
        if self.positions.contains_key(id) {
            debug!("Skipping duplicate document id in inverted index: {}", id);
            return;
        }

        let doc = self.doc_ids.len() as u32;
        let tokens = tokenize(content);

        let mut frequencies: AHashMap<String, u32> = AHashMap::new();
        for token in &tokens {
            *frequencies.entry(token.clone()).or_insert(0) += 1;
        }

        for (term, tf) in frequencies {
            self.postings
                .entry(term)
                .or_default()
                .push(Posting { doc, tf });
        }

        self.doc_ids.push(id.to_string());
        self.doc_lens.push(tokens.len() as u32);
        self.positions.insert(id.to_string(), doc);
        self.total_len += tokens.len() as u64;
    }

    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    fn average_len(&self) -> f32 {
        if self.doc_ids.is_empty() {
            0.0
        } else {
            self.total_len as f32 / self.doc_ids.len() as f32
        }
    }

    /// Non-negative inverse document frequency
    fn idf(&self, doc_freq: usize) -> f32 {
        let n = self.doc_ids.len() as f32;
        let df = doc_freq as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// BM25 score for every document containing at least one query term
    pub fn score(&self, query: &str) -> Vec<(String, f32)> {
        let terms: AHashSet<String> = tokenize(query).into_iter().collect();
        let avg_len = self.average_len().max(f32::EPSILON);
        let Bm25Params { k1, b } = self.params;

        let mut scores: AHashMap<u32, f32> = AHashMap::new();

        for term in &terms {
            let Some(postings) = self.postings.get(term) else {
                continue;
            };
            let idf = self.idf(postings.len());

            for posting in postings {
                let tf = posting.tf as f32;
                let doc_len = self.doc_lens[posting.doc as usize] as f32;
                let norm = k1 * (1.0 - b + b * doc_len / avg_len);
                let contribution = idf * (tf * (k1 + 1.0)) / (tf + norm);
                *scores.entry(posting.doc).or_insert(0.0) += contribution;
            }
        }

        scores
            .into_iter()
            .map(|(doc, score)| (self.doc_ids[doc as usize].clone(), score))
            .collect()
    }
}

impl TextIndex for InvertedIndex {
    fn search_text(&self, query: &str, limit: usize) -> Result<Vec<(String, f32)>> {
        let ranked = rank_descending(self.score(query));
        Ok(ranked
            .into_iter()
            .take(limit)
            .map(|r| (r.document_id, r.raw_score))
            .collect())
    }

    fn num_docs(&self) -> usize {
        self.len()
    }
}

/// Ranks documents against a query using a text index
#[derive(Clone)]
pub struct LexicalScorer {
    index: Arc<dyn TextIndex>,
}

impl LexicalScorer {
    pub fn new(index: Arc<dyn TextIndex>) -> Self {
        Self { index }
    }

    /// Ranked matches for `query`, best first. No matches is an empty list.
    pub fn rank(&self, query: &str, limit: usize) -> Result<Vec<ScoredResult>> {
        if query.trim().is_empty() {
            return Err(TributaryError::EmptyQuery);
        }

        let pairs = self.index.search_text(query, limit)?;
        let mut ranked = rank_descending(pairs);
        ranked.truncate(limit);

        debug!("Lexical scorer matched {} documents", ranked.len());
        Ok(ranked)
    }

    pub fn index(&self) -> &Arc<dyn TextIndex> {
        &self.index
    }
}
