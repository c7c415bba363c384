//! Cross-result relationship detection
//!
//! Pairs of results are tested against relation types in priority order and
//! the first match wins:
//! 1. `test_pair` - one file is a test-naming variant of the other
//! 2. `same_ticket` - both reference the same ticket/issue id in metadata
//! 3. `same_file` - both come from the same file path
//! 4. `documentation_link` - a documentation result mentions the other's id or path
//! 5. `content_similarity` - shingle similarity at or above the threshold
//!
//! Pairs matching nothing get no edge.

pub mod test_patterns;

pub use test_patterns::{MarkerKind, TestPatternConfig, TestPatternTable, TestPatternsConfig};

use crate::config::RelationsConfig;
use crate::error::Result;
use crate::retrieval::{keys, Document};
use crate::text::{jaccard, shingles};
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Relation kinds, declared in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    TestPair,
    SameTicket,
    SameFile,
    DocumentationLink,
    ContentSimilarity,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::TestPair => "test_pair",
            RelationType::SameTicket => "same_ticket",
            RelationType::SameFile => "same_file",
            RelationType::DocumentationLink => "documentation_link",
            RelationType::ContentSimilarity => "content_similarity",
        }
    }

    /// Edge strength for the pattern-based relations
    fn fixed_strength(&self) -> f32 {
        match self {
            RelationType::SameFile => 0.95,
            RelationType::TestPair => 0.9,
            RelationType::SameTicket => 0.85,
            RelationType::DocumentationLink => 0.7,
            RelationType::ContentSimilarity => 0.0,
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed edge from a result to another result in the same response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub target_id: String,
    #[serde(rename = "type")]
    pub relation_type: RelationType,
    /// In (0, 1]
    pub strength: f32,
}

/// Outgoing edges per document id
pub type RelationshipMap = HashMap<String, Vec<Relationship>>;

const DOC_EXTENSIONS: &[&str] = &["md", "markdown", "rst", "adoc", "txt"];

/// What the detector needs to know about one document, computed once
struct Profile<'a> {
    document: &'a Document,
    path: Option<String>,
    tickets: Vec<String>,
    /// Lowercased content, present only for documentation
    documentation_text: Option<String>,
    shingles: AHashSet<u64>,
}

/// Finds pairwise relationships among a result set
#[derive(Debug, Clone)]
pub struct RelationshipDetector {
    table: TestPatternTable,
    ticket_keys: Vec<String>,
    doc_types: Vec<String>,
    similarity_threshold: f32,
    shingle_size: usize,
}

impl RelationshipDetector {
    /// Build a detector, loading the test-pattern table from
    /// `config.test_patterns_file` when one is set
    pub fn new(config: &RelationsConfig, shingle_size: usize) -> Result<Self> {
        let table = if config.test_patterns_file.trim().is_empty() {
            TestPatternTable::builtin()
        } else {
            TestPatternTable::from_file(Path::new(&config.test_patterns_file))?
        };

        Ok(Self {
            table,
            ticket_keys: config.ticket_keys.clone(),
            doc_types: config.doc_types.iter().map(|t| t.to_lowercase()).collect(),
            similarity_threshold: config.content_similarity_threshold,
            shingle_size: shingle_size.max(1),
        })
    }

    pub fn with_table(mut self, table: TestPatternTable) -> Self {
        self.table = table;
        self
    }

    pub fn table(&self) -> &TestPatternTable {
        &self.table
    }

    fn profile<'a>(&self, document: &'a Document) -> Profile<'a> {
        let path = document
            .file_path()
            .map(|p| p.replace('\\', "/").trim_start_matches("./").to_string())
            .filter(|p| !p.is_empty());

        let tickets = self
            .ticket_keys
            .iter()
            .filter_map(|key| document.meta(key))
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty())
            .collect();

        let is_documentation = self.is_documentation(document, path.as_deref());

        Profile {
            document,
            documentation_text: is_documentation.then(|| document.content.to_lowercase()),
            shingles: shingles(&document.content, self.shingle_size),
            path,
            tickets,
        }
    }

    fn is_documentation(&self, document: &Document, path: Option<&str>) -> bool {
        let typed = [keys::DOC_TYPE, keys::SOURCE_TYPE]
            .iter()
            .filter_map(|key| document.meta(key))
            .any(|value| self.doc_types.contains(&value.to_lowercase()));
        if typed {
            return true;
        }

        path.is_some_and(|path| {
            let lowered = path.to_lowercase();
            let in_docs_tree = lowered.starts_with("docs/") || lowered.contains("/docs/");
            let doc_extension = lowered
                .rsplit_once('.')
                .is_some_and(|(_, ext)| DOC_EXTENSIONS.contains(&ext));
            in_docs_tree || doc_extension
        })
    }

    /// First matching relation for a pair, in priority order
    fn relate(&self, a: &Profile<'_>, b: &Profile<'_>) -> Option<(RelationType, f32)> {
        if let (Some(pa), Some(pb)) = (&a.path, &b.path) {
            if self.table.is_test_pair(pa, pb) {
                return Some(with_fixed(RelationType::TestPair));
            }
        }

        if a.tickets.iter().any(|t| b.tickets.contains(t)) {
            return Some(with_fixed(RelationType::SameTicket));
        }

        if let (Some(pa), Some(pb)) = (&a.path, &b.path) {
            if pa == pb {
                return Some(with_fixed(RelationType::SameFile));
            }
        }

        if references(a, b) || references(b, a) {
            return Some(with_fixed(RelationType::DocumentationLink));
        }

        let similarity = jaccard(&a.shingles, &b.shingles);
        if !a.shingles.is_empty() && similarity >= self.similarity_threshold {
            return Some((RelationType::ContentSimilarity, similarity));
        }

        None
    }

    /// Detect relationships among `documents`. Edges are symmetric: a related
    /// pair yields one edge in each direction. Repeated ids are considered once.
    pub fn detect(&self, documents: &[Arc<Document>]) -> RelationshipMap {
        let mut seen = HashSet::new();
        let profiles: Vec<Profile<'_>> = documents
            .iter()
            .filter(|d| seen.insert(d.id.as_str()))
            .map(|d| self.profile(d))
            .collect();

        let mut map = RelationshipMap::new();
        let mut edges = 0usize;

        for (i, a) in profiles.iter().enumerate() {
            for b in &profiles[i + 1..] {
                let Some((relation_type, strength)) = self.relate(a, b) else {
                    continue;
                };

                map.entry(a.document.id.clone())
                    .or_default()
                    .push(Relationship {
                        target_id: b.document.id.clone(),
                        relation_type,
                        strength,
                    });
                map.entry(b.document.id.clone())
                    .or_default()
                    .push(Relationship {
                        target_id: a.document.id.clone(),
                        relation_type,
                        strength,
                    });
                edges += 1;
            }
        }

        for relationships in map.values_mut() {
            relationships.sort_by(|x, y| {
                x.relation_type
                    .cmp(&y.relation_type)
                    .then_with(|| y.strength.total_cmp(&x.strength))
                    .then_with(|| x.target_id.cmp(&y.target_id))
            });
        }

        debug!(
            "Relationship detection: {} related pairs among {} results",
            edges,
            profiles.len()
        );
        map
    }
}

fn with_fixed(relation_type: RelationType) -> (RelationType, f32) {
    (relation_type, relation_type.fixed_strength())
}

/// Whether documentation `doc` mentions `other` by id, path or file name
fn references(doc: &Profile<'_>, other: &Profile<'_>) -> bool {
    let Some(content) = doc.documentation_text.as_deref() else {
        return false;
    };

    let id = other.document.id.to_lowercase();
    if id.len() >= 3 && content.contains(&id) {
        return true;
    }

    other.path.as_deref().is_some_and(|path| {
        let path = path.to_lowercase();
        let file_name = path.rsplit('/').next().unwrap_or_default();
        content.contains(&path) || (file_name.contains('.') && content.contains(file_name))
    })
}
