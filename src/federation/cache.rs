//! Response cache keyed by full request identity

use super::SearchResponse;
use crate::retrieval::SearchRequest;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// LRU cache of federated responses.
///
/// Keys cover every field of the request, pagination included, plus the set
/// of sources that answered: disabling a source must not serve a response
/// built with it.
pub struct ResponseCache {
    entries: Mutex<LruCache<String, SearchResponse>>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cache key for `request` answered by `source_ids`
    pub fn key(request: &SearchRequest, source_ids: &[&str]) -> String {
        let mut ids = source_ids.to_vec();
        ids.sort_unstable();

        let mut hasher = blake3::Hasher::new();
        hasher.update(request.cache_key().as_bytes());
        for id in ids {
            hasher.update(&(id.len() as u64).to_le_bytes());
            hasher.update(id.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    pub fn get(&self, key: &str) -> Option<SearchResponse> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: String, response: SearchResponse) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(key, response);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
