//! Documents and the read-only store collaborator they are served from

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Metadata keys with meaning to the engine
pub mod keys {
    pub const FILE_PATH: &str = "file_path";
    pub const SOURCE_TYPE: &str = "source_type";
    pub const DOC_TYPE: &str = "doc_type";
}

/// Key/value metadata attached to a document. Ordered so serialization is stable.
pub type Metadata = BTreeMap<String, String>;

/// A unit of retrievable content produced by the ingestion pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable unique identifier
    pub id: String,

    /// Text body
    pub content: String,

    /// Dense embedding, absent when the source has none for this item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,

    /// File path, source type, ticket id, timestamps, tags...
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            vector: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// File path this document was extracted from, if any
    pub fn file_path(&self) -> Option<&str> {
        self.metadata.get(keys::FILE_PATH).map(String::as_str)
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Exact-match metadata constraints. Every pair must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentFilter {
    #[serde(flatten)]
    pub constraints: BTreeMap<String, String>,
}

impl DocumentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.constraints.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.constraints
            .iter()
            .all(|(key, value)| document.metadata.get(key) == Some(value))
    }
}

impl From<BTreeMap<String, String>> for DocumentFilter {
    fn from(constraints: BTreeMap<String, String>) -> Self {
        Self { constraints }
    }
}

/// Read-only access to indexed documents.
///
/// Implementations must tolerate concurrent readers; the engine never writes.
pub trait DocumentStore: Send + Sync {
    /// All documents matching `filter`
    fn get_documents(&self, filter: &DocumentFilter) -> Result<Vec<Arc<Document>>>;

    /// Documents matching `filter` that carry an embedding
    fn documents_with_vectors(&self, filter: &DocumentFilter) -> Result<Vec<Arc<Document>>> {
        Ok(self
            .get_documents(filter)?
            .into_iter()
            .filter(|d| d.vector.is_some())
            .collect())
    }
}

/// Process-local document store
#[derive(Default)]
pub struct InMemoryStore {
    documents: Vec<Arc<Document>>,
}

impl InMemoryStore {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents: documents.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl DocumentStore for InMemoryStore {
    fn get_documents(&self, filter: &DocumentFilter) -> Result<Vec<Arc<Document>>> {
        Ok(self
            .documents
            .iter()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemoryStore {
        InMemoryStore::new(vec![
            Document::new("a", "alpha")
                .with_metadata("source_type", "code")
                .with_vector(vec![1.0, 0.0]),
            Document::new("b", "beta").with_metadata("source_type", "ticket"),
            Document::new("c", "gamma")
                .with_metadata("source_type", "code")
                .with_metadata("lang", "rust"),
        ])
    }

    #[test]
    fn test_empty_filter_returns_everything() {
        let docs = store().get_documents(&DocumentFilter::new()).unwrap();
        assert_eq!(docs.len(), 3);
    }

    #[test]
    fn test_filter_requires_every_constraint() {
        let store = store();
        let code = store
            .get_documents(&DocumentFilter::new().with("source_type", "code"))
            .unwrap();
        assert_eq!(code.len(), 2);

        let rust = store
            .get_documents(
                &DocumentFilter::new()
                    .with("source_type", "code")
                    .with("lang", "rust"),
            )
            .unwrap();
        assert_eq!(rust.len(), 1);
        assert_eq!(rust[0].id, "c");
    }

    #[test]
    fn test_documents_with_vectors() {
        let docs = store()
            .documents_with_vectors(&DocumentFilter::new())
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "a");
    }

    #[test]
    fn test_document_deserializes_without_optional_fields() {
        let doc: Document = serde_json::from_str(r#"{"id":"x","content":"body"}"#).unwrap();
        assert!(doc.vector.is_none());
        assert!(doc.metadata.is_empty());
    }
}
