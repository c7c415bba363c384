//! JSON corpus files served by the `search` command
//!
//! ```json
//! { "sources": [ { "id": "code", "documents": [ { "id": "...", "content": "..." } ] } ] }
//! ```

use crate::config::RetrievalConfig;
use crate::error::{Result, TributaryError};
use crate::federation::{HybridSource, StaticRegistry};
use crate::retrieval::{Document, HybridSearcher, InMemoryStore, KeywordIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// One source's documents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusSource {
    pub id: String,
    #[serde(default)]
    pub documents: Vec<Document>,
}

/// A set of sources loaded from disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corpus {
    pub sources: Vec<CorpusSource>,
}

impl Corpus {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TributaryError::Io {
            source: e,
            context: format!("Failed to read corpus: {:?}", path),
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let corpus: Corpus = serde_json::from_str(content).map_err(|e| TributaryError::Json {
            source: e,
            context: "Failed to parse corpus".to_string(),
        })?;

        let mut seen = HashSet::new();
        for source in &corpus.sources {
            check_source_id(&source.id)?;
            if !seen.insert(source.id.as_str()) {
                return Err(TributaryError::Config(format!(
                    "Duplicate corpus source id '{}'",
                    source.id
                )));
            }
        }

        Ok(corpus)
    }

    pub fn document_count(&self) -> usize {
        self.sources.iter().map(|s| s.documents.len()).sum()
    }

    /// Register one [`HybridSource`] per corpus source.
    ///
    /// With `index_dir`, each source's text index is a tantivy index under
    /// `index_dir/<source id>`; otherwise an in-memory BM25 index is built.
    pub fn build_registry(
        &self,
        config: &RetrievalConfig,
        index_dir: Option<&Path>,
    ) -> Result<StaticRegistry> {
        let registry = StaticRegistry::new();

        for source in &self.sources {
            let searcher = match index_dir {
                Some(dir) => {
                    check_source_id(&source.id)?;
                    let index = KeywordIndex::open_or_create(dir.join(&source.id))?;
                    index.clear()?;
                    index.index_documents(source.documents.iter())?;
                    let store = InMemoryStore::new(source.documents.clone());
                    HybridSearcher::new(Arc::new(store), Arc::new(index), config.clone())?
                }
                None => HybridSearcher::from_documents(source.documents.clone(), config.clone())?,
            };

            info!(
                "Loaded source '{}' with {} documents",
                source.id,
                source.documents.len()
            );
            registry.register(Arc::new(HybridSource::new(source.id.clone(), searcher)));
        }

        Ok(registry)
    }
}

/// Source ids name index directories, so they must be a single path component
fn check_source_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(TributaryError::Config("Corpus source with empty id".to_string()));
    }
    if id == "." || id.contains("..") || id.contains(['/', '\\']) {
        return Err(TributaryError::Config(format!(
            "Corpus source id '{}' must not contain path separators or '..'",
            id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::SourceRegistry;

    const CORPUS: &str = r#"{
        "sources": [
            { "id": "code", "documents": [
                { "id": "retry", "content": "retry with backoff", "metadata": { "file_path": "src/retry.rs" } }
            ] },
            { "id": "tickets", "documents": [
                { "id": "T-1", "content": "backoff is too aggressive", "vector": [0.1, 0.9] }
            ] }
        ]
    }"#;

    #[test]
    fn test_parse_corpus() {
        let corpus = Corpus::from_json(CORPUS).unwrap();
        assert_eq!(corpus.sources.len(), 2);
        assert_eq!(corpus.document_count(), 2);
        assert_eq!(
            corpus.sources[0].documents[0].file_path(),
            Some("src/retry.rs")
        );
        assert_eq!(corpus.sources[1].documents[0].vector, Some(vec![0.1, 0.9]));
    }

    #[test]
    fn test_duplicate_source_ids_rejected() {
        let json = r#"{ "sources": [ { "id": "a" }, { "id": "a" } ] }"#;
        assert!(Corpus::from_json(json).is_err());
    }

    #[test]
    fn test_path_like_source_ids_rejected() {
        for id in ["../other", "a/b", "a\\\\b", "..", ".", "  "] {
            let json = format!(r#"{{ "sources": [ {{ "id": "{}" }} ] }}"#, id);
            assert!(
                matches!(Corpus::from_json(&json), Err(TributaryError::Config(_))),
                "accepted {:?}",
                id
            );
        }
        assert!(Corpus::from_json(r#"{ "sources": [ { "id": "code-v2.1" } ] }"#).is_ok());
    }

    #[test]
    fn test_build_registry_checks_ids_before_touching_disk() {
        let temp = tempfile::TempDir::new().unwrap();
        let index_dir = temp.path().join("indexes");
        let corpus = Corpus {
            sources: vec![CorpusSource {
                id: "../escaped".to_string(),
                documents: vec![Document::new("a", "alpha")],
            }],
        };

        assert!(corpus
            .build_registry(&RetrievalConfig::default(), Some(&index_dir))
            .is_err());
        assert!(!temp.path().join("escaped").exists());
    }

    #[test]
    fn test_build_registry_in_memory() {
        let corpus = Corpus::from_json(CORPUS).unwrap();
        let registry = corpus
            .build_registry(&RetrievalConfig::default(), None)
            .unwrap();
        let ids: Vec<String> = registry
            .list_active()
            .iter()
            .map(|s| s.id().to_string())
            .collect();
        assert_eq!(ids, vec!["code", "tickets"]);
    }

    #[test]
    fn test_build_registry_with_keyword_index() {
        let temp = tempfile::TempDir::new().unwrap();
        let corpus = Corpus::from_json(CORPUS).unwrap();
        let registry = corpus
            .build_registry(&RetrievalConfig::default(), Some(temp.path()))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(temp.path().join("code").join("meta.json").exists());
    }
}
