//! Tributary - Hybrid Retrieval and Multi-Source Federation
//!
//! Scores documents lexically (BM25) and semantically (cosine similarity),
//! fuses both rankings with weighted reciprocal rank fusion, fans queries out
//! to many independent sources under a shared deadline, and merges what comes
//! back into one deduplicated, relationship-annotated, paginated result list.

pub mod cli;
pub mod config;
pub mod error;
pub mod federation;
pub mod merge;
pub mod relations;
pub mod retrieval;
pub mod text;

pub use config::Config;
pub use error::{Result, TributaryError};
pub use federation::{
    Federator, HybridSource, QueryContext, SearchResponse, SearchableSource, SourceRegistry,
    StaticRegistry,
};
pub use merge::{ResultMerger, SearchResultItem};
pub use relations::{RelationType, Relationship, RelationshipDetector};
pub use retrieval::{Document, HybridSearcher, SearchRequest, SourceHit};
