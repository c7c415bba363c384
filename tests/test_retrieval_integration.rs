//! Integration tests: hybrid retrieval over both text index backends

use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;
use tributary::config::RetrievalConfig;
use tributary::retrieval::{
    Document, HybridSearcher, InMemoryStore, KeywordIndex, SearchRequest, SourceHit,
};

fn ids(hits: &[SourceHit]) -> Vec<&str> {
    hits.iter().map(|h| h.document.id.as_str()).collect()
}

fn unit(dim: usize, hot: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[hot % dim] = 1.0;
    v
}

#[test]
fn test_hybrid_search_over_tantivy_index() {
    let temp = TempDir::new().unwrap();
    let documents = vec![
        Document::new("timeout", "connection timeout while dialing the upstream host"),
        Document::new("pool", "connection pool sizing guide"),
        Document::new("parser", "parse json payloads into typed structs"),
    ];

    let index = KeywordIndex::open_or_create(temp.path().join("keywords")).unwrap();
    index.index_documents(documents.iter()).unwrap();
    assert_eq!(index.len(), 3);

    let searcher = HybridSearcher::new(
        Arc::new(InMemoryStore::new(documents)),
        Arc::new(index),
        RetrievalConfig::default(),
    )
    .unwrap();

    let hits = searcher
        .search(&SearchRequest::new("connection timeout"))
        .unwrap();

    assert_eq!(ids(&hits), vec!["timeout", "pool"]);
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert!(hits[1].score < hits[0].score);
    assert_eq!(
        hits.iter().map(|h| h.rank).collect::<Vec<_>>(),
        vec![1, 2]
    );
}

#[test]
fn test_mismatched_dimensions_stay_lexically_eligible() {
    let mut documents: Vec<Document> = (0..5)
        .map(|i| {
            Document::new(format!("narrow-{}", i), format!("ordinary note {}", i))
                .with_vector(unit(128, i))
        })
        .collect();
    documents.push(
        Document::new("wide", "the zephyr migration plan").with_vector(unit(256, 0)),
    );

    let searcher = HybridSearcher::from_documents(documents, RetrievalConfig::default()).unwrap();
    let request = SearchRequest::new("zephyr")
        .with_vector(unit(128, 0))
        .with_alpha(0.5);
    let hits = searcher.search(&request).unwrap();

    let found = ids(&hits);
    assert_eq!(found.len(), 6);
    assert!(found.contains(&"wide"));
    // Lexical rank 1 and vector rank 1 tie at equal weight; ids break the tie
    assert_eq!(&found[..2], &["narrow-0", "wide"]);
}

#[test]
fn test_alpha_extremes_reproduce_single_rankings() {
    let documents = vec![
        Document::new("apple", "apple orchard harvest").with_vector(vec![1.0, 0.0]),
        Document::new("banana", "banana plantation").with_vector(vec![0.0, 1.0]),
        Document::new("cherry", "cherry blossom").with_vector(vec![0.6, 0.8]),
    ];
    let searcher = HybridSearcher::from_documents(documents, RetrievalConfig::default()).unwrap();

    let lexical_only = searcher
        .search(
            &SearchRequest::new("apple")
                .with_vector(vec![0.0, 1.0])
                .with_alpha(0.0),
        )
        .unwrap();
    assert_eq!(ids(&lexical_only), vec!["apple"]);

    let vector_only = searcher
        .search(
            &SearchRequest::new("apple")
                .with_vector(vec![0.0, 1.0])
                .with_alpha(1.0),
        )
        .unwrap();
    assert_eq!(ids(&vector_only), vec!["banana", "cherry", "apple"]);
    assert!(vector_only
        .iter()
        .all(|h| (0.0..=1.0).contains(&h.score)));
}

#[test]
fn test_vector_only_request_without_text() {
    let documents = vec![
        Document::new("a", "first").with_vector(vec![1.0, 0.0]),
        Document::new("b", "second").with_vector(vec![0.7, 0.7]),
        Document::new("c", "no embedding here"),
    ];
    let searcher = HybridSearcher::from_documents(documents, RetrievalConfig::default()).unwrap();

    let hits = searcher
        .search(&SearchRequest::new("").with_vector(vec![1.0, 0.1]))
        .unwrap();

    assert_eq!(ids(&hits), vec!["a", "b"]);
}

#[test]
fn test_empty_request_is_rejected() {
    let searcher = HybridSearcher::from_documents(
        vec![Document::new("a", "anything")],
        RetrievalConfig::default(),
    )
    .unwrap();

    let err = searcher.search(&SearchRequest::new("   ")).unwrap_err();
    assert!(err.is_input_error());
}
