//! Hybrid search combining lexical and vector ranking for one data source

use crate::config::RetrievalConfig;
use crate::error::{Result, TributaryError};
use crate::retrieval::{
    reciprocal_rank_fusion, Bm25Params, Document, DocumentStore, FusionConfig, InMemoryStore,
    InvertedIndex, LexicalScorer, ScoredResult, SearchRequest, SourceHit, TextIndex, VectorScorer,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Hybrid searcher combining lexical and vector search over one source
pub struct HybridSearcher {
    store: Arc<dyn DocumentStore>,
    lexical: LexicalScorer,
    vector: VectorScorer,
    config: RetrievalConfig,
}

impl HybridSearcher {
    /// Create a new hybrid searcher
    pub fn new(
        store: Arc<dyn DocumentStore>,
        text_index: Arc<dyn TextIndex>,
        config: RetrievalConfig,
    ) -> Result<Self> {
        // Surface a bad rrf_k at construction rather than on first query
        FusionConfig::new(config.rrf_k, config.default_alpha)?;

        Ok(Self {
            store,
            lexical: LexicalScorer::new(text_index),
            vector: VectorScorer::new(config.default_vector_limit),
            config,
        })
    }

    /// Searcher over an in-memory store with an exact BM25 index
    pub fn from_documents(documents: Vec<Document>, config: RetrievalConfig) -> Result<Self> {
        let params = Bm25Params {
            k1: config.bm25_k1,
            b: config.bm25_b,
        };
        let index = InvertedIndex::from_documents(documents.iter(), params);
        let store = InMemoryStore::new(documents);
        Self::new(Arc::new(store), Arc::new(index), config)
    }

    /// Perform hybrid search.
    ///
    /// Returns up to `max(request.limit, source_result_cap)` hits ordered by
    /// fused relevance, each scored in [0, 1]. `request.offset` is not applied
    /// here: paging happens after results from every source are merged.
    pub fn search(&self, request: &SearchRequest) -> Result<Vec<SourceHit>> {
        self.search_cancellable(request, &CancellationToken::new())
    }

    /// [`search`](Self::search) that gives up with
    /// [`TributaryError::Cancelled`] once `cancel` fires. The token is checked
    /// between the candidate, lexical, vector and fusion steps.
    pub fn search_cancellable(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<SourceHit>> {
        request.validate()?;

        let use_text = request.has_text();
        let query_vector = request.query_vector.as_deref();

        // Degrade to a single list when one input is missing
        let alpha = match (use_text, query_vector.is_some()) {
            (true, true) => request.alpha.unwrap_or(self.config.default_alpha),
            (true, false) => 0.0,
            (false, _) => 1.0,
        };
        let fusion = FusionConfig::new(self.config.rrf_k, alpha)?;

        let cap = request
            .limit
            .unwrap_or(0)
            .max(self.config.source_result_cap)
            .max(1);
        let pool = cap.saturating_mul(self.config.search_multiplier.max(1));

        // Step 1: Resolve the filtered candidate set
        let documents = self.store.get_documents(&request.filters)?;
        check_cancelled(cancel)?;
        let by_id: HashMap<&str, &Arc<Document>> =
            documents.iter().map(|d| (d.id.as_str(), d)).collect();

        // Step 2: Lexical ranking restricted to filtered documents
        let lexical_results = if use_text {
            let depth = if request.filters.is_empty() {
                pool
            } else {
                pool.max(self.lexical.index().num_docs())
            };
            let ranked = self.lexical.rank(&request.query_text, depth)?;
            renumber(
                ranked
                    .into_iter()
                    .filter(|r| by_id.contains_key(r.document_id.as_str()))
                    .collect(),
            )
        } else {
            Vec::new()
        };
        check_cancelled(cancel)?;

        // Step 3: Vector ranking over filtered documents carrying embeddings
        let vector_results = match query_vector {
            Some(query) => {
                let candidates = self.store.documents_with_vectors(&request.filters)?;
                self.vector.rank(query, &candidates, Some(pool))?
            }
            None => Vec::new(),
        };
        check_cancelled(cancel)?;

        debug!(
            "Hybrid search: {} lexical + {} vector candidates (alpha={})",
            lexical_results.len(),
            vector_results.len(),
            alpha
        );

        // Step 4: Reciprocal Rank Fusion
        let fused = reciprocal_rank_fusion(&lexical_results, &vector_results, &fusion);

        // Step 5: Hydrate, scale to [0, 1] and apply the score cutoff
        let max_score = fusion.max_score();
        let min_score = request.min_score.unwrap_or(0.0);

        let hits: Vec<SourceHit> = fused
            .into_iter()
            .filter_map(|result| {
                let document = by_id.get(result.document_id.as_str())?;
                let score = (result.raw_score / max_score).clamp(0.0, 1.0);
                (score >= min_score).then(|| SourceHit {
                    document: Arc::clone(document),
                    rank: 0,
                    score,
                })
            })
            .take(cap)
            .enumerate()
            .map(|(idx, mut hit)| {
                hit.rank = idx + 1;
                hit
            })
            .collect();

        debug!("Hybrid search returned {} hits", hits.len());
        Ok(hits)
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(TributaryError::Cancelled);
    }
    Ok(())
}

/// Reassign 1-based ranks after filtering removed entries
fn renumber(mut results: Vec<ScoredResult>) -> Vec<ScoredResult> {
    for (idx, result) in results.iter_mut().enumerate() {
        result.rank = idx + 1;
    }
    results
}
