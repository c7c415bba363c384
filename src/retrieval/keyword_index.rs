//! Tantivy keyword index, a persistent text index collaborator
use super::{Document, TextIndex};
use crate::error::{Result, TributaryError};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy};
use tracing::debug;

fn index_err(context: &str, e: impl std::fmt::Display) -> TributaryError {
    TributaryError::Index(format!("{}: {}", context, e))
}

/// Tantivy keyword index wrapper
///
/// Provides on-disk full-text search with tantivy's BM25 ranking. The writer
/// sits behind a mutex so the index can be shared read-mostly across tasks.
pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    id_field: Field,
    text_field: Field,
    index_path: PathBuf,
}

impl KeywordIndex {
    /// Open the index at `index_path`, creating it when absent
    pub fn open_or_create(index_path: impl AsRef<Path>) -> Result<Self> {
        let index_path = index_path.as_ref().to_path_buf();

        let index = if index_path.join("meta.json").exists() {
            Index::open_in_dir(&index_path).map_err(|e| index_err("Failed to open index", e))?
        } else {
            std::fs::create_dir_all(&index_path).map_err(|e| TributaryError::Io {
                source: e,
                context: format!("Failed to create index directory: {:?}", index_path),
            })?;

            let mut schema_builder = Schema::builder();
            schema_builder.add_text_field("id", STRING | STORED);
            schema_builder.add_text_field("text", TEXT);
            let schema = schema_builder.build();

            Index::create_in_dir(&index_path, schema)
                .map_err(|e| index_err("Failed to create index", e))?
        };

        let schema = index.schema();
        let id_field = schema
            .get_field("id")
            .map_err(|_| TributaryError::Index("Missing 'id' field in schema".to_string()))?;
        let text_field = schema
            .get_field("text")
            .map_err(|_| TributaryError::Index("Missing 'text' field in schema".to_string()))?;

        let writer = index
            .writer(50_000_000) // 50MB buffer
            .map_err(|e| index_err("Failed to create writer", e))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| index_err("Failed to create reader", e))?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            id_field,
            text_field,
            index_path,
        })
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, IndexWriter>> {
        self.writer
            .lock()
            .map_err(|_| TributaryError::Index("index writer lock poisoned".to_string()))
    }

    /// Add a document. Call [`commit`](Self::commit) to make it searchable.
    pub fn insert(&self, id: &str, text: &str) -> Result<()> {
        let writer = self.writer()?;
        writer
            .add_document(doc!(
                self.id_field => id,
                self.text_field => text,
            ))
            .map_err(|e| index_err("Insert failed", e))?;
        Ok(())
    }

    /// Index document bodies, superseding earlier versions with the same id
    pub fn index_documents<'a>(
        &self,
        documents: impl IntoIterator<Item = &'a Document>,
    ) -> Result<()> {
        for document in documents {
            self.delete(&document.id)?;
            self.insert(&document.id, &document.content)?;
        }
        self.commit()
    }

    /// Commit pending changes and reload the reader
    pub fn commit(&self) -> Result<()> {
        self.writer()?
            .commit()
            .map_err(|e| index_err("Commit failed", e))?;

        self.reader
            .reload()
            .map_err(|e| index_err("Reader reload failed", e))?;

        Ok(())
    }

    /// Delete a document by id
    pub fn delete(&self, id: &str) -> Result<()> {
        let term = Term::from_field_text(self.id_field, id);
        self.writer()?.delete_term(term);
        Ok(())
    }

    /// Clear the entire index
    pub fn clear(&self) -> Result<()> {
        self.writer()?
            .delete_all_documents()
            .map_err(|e| index_err("Clear failed", e))?;
        self.commit()
    }

    pub fn len(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> &Path {
        &self.index_path
    }
}

impl TextIndex for KeywordIndex {
    fn search_text(&self, query: &str, limit: usize) -> Result<Vec<(String, f32)>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        // Code queries are full of query-syntax characters; parse leniently
        let query_parser = QueryParser::for_index(&self.index, vec![self.text_field]);
        let (query, errors) = query_parser.parse_query_lenient(query);
        if !errors.is_empty() {
            debug!("Lenient query parse dropped {} clauses", errors.len());
        }

        let top_docs = searcher
            .search(&*query, &TopDocs::with_limit(limit))
            .map_err(|e| index_err("Search failed", e))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let retrieved: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| index_err("Failed to load document", e))?;

            let id = retrieved
                .get_first(self.id_field)
                .and_then(|v| v.as_str())
                .ok_or_else(|| TributaryError::Index("Missing or invalid id field".to_string()))?;

            results.push((id.to_string(), score));
        }

        Ok(results)
    }

    fn num_docs(&self) -> usize {
        self.len() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_index_creation() {
        let temp = TempDir::new().unwrap();
        let index = KeywordIndex::open_or_create(temp.path().join("kw")).unwrap();
        assert_eq!(index.len(), 0);
        assert!(index.is_empty());
    }

    #[test]
    fn test_insert_and_search() {
        let temp = TempDir::new().unwrap();
        let index = KeywordIndex::open_or_create(temp.path().join("kw")).unwrap();

        let docs = vec![
            Document::new("src/retry.rs", "retry the request with exponential backoff"),
            Document::new("src/pool.rs", "connection pool with retry budget"),
            Document::new("README.md", "project overview and installation"),
        ];
        index.index_documents(docs.iter()).unwrap();
        assert_eq!(index.len(), 3);

        let results = index.search_text("retry", 10).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|(id, _)| id == "src/retry.rs" || id == "src/pool.rs"));

        let results = index.search_text("installation", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "README.md");
    }

    #[test]
    fn test_code_query_does_not_fail() {
        let temp = TempDir::new().unwrap();
        let index = KeywordIndex::open_or_create(temp.path().join("kw")).unwrap();
        index
            .index_documents([Document::new("a", "fn connect(addr: &str)")].iter())
            .unwrap();

        assert!(index.search_text("connect(addr: &str", 10).is_ok());
        assert!(index.search_text("(((", 10).is_ok());
    }

    #[test]
    fn test_reindex_supersedes() {
        let temp = TempDir::new().unwrap();
        let index = KeywordIndex::open_or_create(temp.path().join("kw")).unwrap();

        index
            .index_documents([Document::new("a", "old body")].iter())
            .unwrap();
        index
            .index_documents([Document::new("a", "new body")].iter())
            .unwrap();

        assert_eq!(index.len(), 1);
        assert!(index.search_text("old", 10).unwrap().is_empty());
        assert_eq!(index.search_text("new", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_reload_from_disk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("kw");

        {
            let index = KeywordIndex::open_or_create(&path).unwrap();
            index
                .index_documents([Document::new("a", "persisted document")].iter())
                .unwrap();
        }

        let index = KeywordIndex::open_or_create(&path).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.search_text("persisted", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_clear() {
        let temp = TempDir::new().unwrap();
        let index = KeywordIndex::open_or_create(temp.path().join("kw")).unwrap();
        index
            .index_documents([Document::new("a", "one"), Document::new("b", "two")].iter())
            .unwrap();
        index.clear().unwrap();
        assert!(index.is_empty());
    }
}
