//! Multi-source federation
//!
//! Each data source is a [`SearchableSource`]; the coordinator takes a
//! snapshot of the active sources from a [`SourceRegistry`] per request and
//! fans the query out to all of them concurrently.

pub mod cache;
pub mod coordinator;

pub use cache::ResponseCache;
pub use coordinator::{
    FederationState, Federator, QueryContext, SearchResponse, SourceOutcome, SourceStatus,
};

use crate::error::{Result, TributaryError};
use crate::retrieval::{HybridSearcher, SearchRequest, SourceHit};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A data source the coordinator can query
#[async_trait]
pub trait SearchableSource: Send + Sync {
    /// Stable identifier reported as `source_id` on results
    fn id(&self) -> &str;

    /// Ranked hits for `request`, best first, scores in [0, 1].
    ///
    /// Sources return results from the top of their ranking; the coordinator
    /// sets `offset` to 0 and pages the merged union itself. `cancel` fires
    /// when the request is cancelled or its deadline passes; long-running
    /// sources should check it and stop early.
    async fn search(
        &self,
        request: SearchRequest,
        cancel: CancellationToken,
    ) -> Result<Vec<SourceHit>>;
}

/// Source of the active source set, consulted once per request
pub trait SourceRegistry: Send + Sync {
    fn list_active(&self) -> Vec<Arc<dyn SearchableSource>>;
}

struct Registration {
    source: Arc<dyn SearchableSource>,
    enabled: bool,
}

/// Registry over a fixed set of sources that can be toggled at runtime
#[derive(Default)]
pub struct StaticRegistry {
    sources: RwLock<Vec<Registration>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(self, source: Arc<dyn SearchableSource>) -> Self {
        self.register(source);
        self
    }

    /// Add a source, enabled. A source with the same id is replaced.
    pub fn register(&self, source: Arc<dyn SearchableSource>) {
        let mut sources = self.sources.write().unwrap_or_else(|e| e.into_inner());
        sources.retain(|r| r.source.id() != source.id());
        debug!("Registered source '{}'", source.id());
        sources.push(Registration {
            source,
            enabled: true,
        });
    }

    /// Remove a source. Returns whether it was registered.
    pub fn unregister(&self, id: &str) -> bool {
        let mut sources = self.sources.write().unwrap_or_else(|e| e.into_inner());
        let before = sources.len();
        sources.retain(|r| r.source.id() != id);
        sources.len() != before
    }

    fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        let mut sources = self.sources.write().unwrap_or_else(|e| e.into_inner());
        match sources.iter_mut().find(|r| r.source.id() == id) {
            Some(registration) => {
                registration.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Include a source in future snapshots. Returns whether it exists.
    pub fn enable(&self, id: &str) -> bool {
        self.set_enabled(id, true)
    }

    /// Exclude a source from future snapshots. Returns whether it exists.
    pub fn disable(&self, id: &str) -> bool {
        self.set_enabled(id, false)
    }

    pub fn len(&self) -> usize {
        self.sources.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SourceRegistry for StaticRegistry {
    fn list_active(&self) -> Vec<Arc<dyn SearchableSource>> {
        self.sources
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.enabled)
            .map(|r| Arc::clone(&r.source))
            .collect()
    }
}

/// A [`HybridSearcher`] exposed as a federated source.
///
/// Scoring is CPU-bound, so each search runs on the blocking thread pool.
pub struct HybridSource {
    id: String,
    searcher: Arc<HybridSearcher>,
}

impl HybridSource {
    pub fn new(id: impl Into<String>, searcher: HybridSearcher) -> Self {
        Self {
            id: id.into(),
            searcher: Arc::new(searcher),
        }
    }

    pub fn searcher(&self) -> &HybridSearcher {
        &self.searcher
    }
}

#[async_trait]
impl SearchableSource for HybridSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn search(
        &self,
        request: SearchRequest,
        cancel: CancellationToken,
    ) -> Result<Vec<SourceHit>> {
        let searcher = Arc::clone(&self.searcher);

        tokio::task::spawn_blocking(move || searcher.search_cancellable(&request, &cancel))
            .await
            .map_err(|e| TributaryError::Source {
                source_id: self.id.clone(),
                message: format!("search task failed: {}", e),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::retrieval::Document;

    struct Named(&'static str);

    #[async_trait]
    impl SearchableSource for Named {
        fn id(&self) -> &str {
            self.0
        }

        async fn search(
            &self,
            _request: SearchRequest,
            _cancel: CancellationToken,
        ) -> Result<Vec<SourceHit>> {
            Ok(Vec::new())
        }
    }

    fn ids(registry: &StaticRegistry) -> Vec<String> {
        registry
            .list_active()
            .iter()
            .map(|s| s.id().to_string())
            .collect()
    }

    #[test]
    fn test_registry_toggling() {
        let registry = StaticRegistry::new()
            .with_source(Arc::new(Named("code")))
            .with_source(Arc::new(Named("tickets")));

        assert_eq!(ids(&registry), vec!["code", "tickets"]);

        assert!(registry.disable("code"));
        assert_eq!(ids(&registry), vec!["tickets"]);

        assert!(registry.enable("code"));
        assert_eq!(ids(&registry), vec!["code", "tickets"]);

        assert!(!registry.disable("missing"));
        assert!(registry.unregister("tickets"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_replaces_same_id() {
        let registry = StaticRegistry::new();
        registry.register(Arc::new(Named("code")));
        registry.register(Arc::new(Named("code")));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_hybrid_source_searches_on_blocking_pool() {
        let searcher = HybridSearcher::from_documents(
            vec![
                Document::new("a", "retry with backoff"),
                Document::new("b", "sidebar layout"),
            ],
            RetrievalConfig::default(),
        )
        .unwrap();
        let source = HybridSource::new("code", searcher);

        let hits = source
            .search(SearchRequest::new("backoff"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(source.id(), "code");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.id, "a");

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            source.search(SearchRequest::new("backoff"), cancel).await,
            Err(TributaryError::Cancelled)
        ));
    }
}
