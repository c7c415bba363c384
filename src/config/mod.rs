//! Configuration management for Tributary
//!
//! Configuration is read from TOML, then environment overrides of the form
//! `TRIBUTARY_SECTION__KEY=value` are applied, then the result is validated.
//! Every section is optional in the file and falls back to its defaults.

use crate::error::{Result, TributaryError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

mod validator;

pub use validator::ConfigValidator;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "TRIBUTARY_";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta", default)]
    pub meta: MetaConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub federation: FederationConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub relations: RelationsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            schema_version: "1.0.0".to_string(),
            created_at: current_timestamp(),
        }
    }
}

/// Per-source hybrid retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// RRF constant K
    pub rrf_k: f32,
    /// Fusion weight when a request omits alpha
    pub default_alpha: f32,
    pub bm25_k1: f32,
    pub bm25_b: f32,
    /// Vector scorer cap when the caller gives no limit
    pub default_vector_limit: usize,
    /// Each scorer ranks `limit * search_multiplier` candidates before fusion
    pub search_multiplier: usize,
    /// Minimum number of results a source returns to the coordinator
    pub source_result_cap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            default_alpha: 0.5,
            bm25_k1: 1.2,
            bm25_b: 0.75,
            default_vector_limit: 10,
            search_multiplier: 3,
            source_result_cap: 50,
        }
    }
}

/// Fan-out, deadline and pagination bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    pub timeout_ms: u64,
    pub default_limit: usize,
    pub max_limit: usize,
    pub max_concurrent_sources: usize,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            default_limit: 10,
            max_limit: 100,
            max_concurrent_sources: 16,
        }
    }
}

/// Deduplication and diversity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Results at or above this content similarity are duplicates
    pub dedup_threshold: f32,
    /// Added to results of under-represented sources before normalization
    pub diversity_boost: f32,
    /// Words per shingle for content similarity
    pub shingle_size: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            dedup_threshold: 0.85,
            diversity_boost: 0.05,
            shingle_size: 3,
        }
    }
}

/// Relationship detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationsConfig {
    pub enabled: bool,
    pub content_similarity_threshold: f32,
    /// Metadata keys holding ticket/issue identifiers
    pub ticket_keys: Vec<String>,
    /// `doc_type`/`source_type` values that mark documentation
    pub doc_types: Vec<String>,
    /// TOML file replacing the built-in test naming table; empty for built-in
    pub test_patterns_file: String,
}

impl Default for RelationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            content_similarity_threshold: 0.85,
            ticket_keys: vec![
                "ticket_id".to_string(),
                "issue_id".to_string(),
                "ticket".to_string(),
            ],
            doc_types: vec![
                "doc".to_string(),
                "docs".to_string(),
                "documentation".to_string(),
                "markdown".to_string(),
            ],
            test_patterns_file: String::new(),
        }
    }
}

/// Response cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 256,
        }
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_alpha: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rrf_k: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_result_cap: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup_threshold: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diversity_boost: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relations_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_enabled: Option<bool>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TributaryError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| TributaryError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load `path` if it exists, otherwise start from defaults.
    /// Environment overrides and validation apply either way.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }

        tracing::debug!("No config at {:?}, using defaults", path);
        let mut config = Self::default();
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Save configuration to a file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TributaryError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| TributaryError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| TributaryError::Config(format!("Unknown profile '{}'", profile)))?;

        if let Some(alpha) = overrides.default_alpha {
            self.retrieval.default_alpha = alpha;
        }
        if let Some(k) = overrides.rrf_k {
            self.retrieval.rrf_k = k;
        }
        if let Some(cap) = overrides.source_result_cap {
            self.retrieval.source_result_cap = cap;
        }
        if let Some(timeout) = overrides.timeout_ms {
            self.federation.timeout_ms = timeout;
        }
        if let Some(threshold) = overrides.dedup_threshold {
            self.merge.dedup_threshold = threshold;
        }
        if let Some(boost) = overrides.diversity_boost {
            self.merge.diversity_boost = boost;
        }
        if let Some(enabled) = overrides.relations_enabled {
            self.relations.enabled = enabled;
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = enabled;
        }

        tracing::debug!("Applied profile '{}'", profile);
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: TRIBUTARY_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    /// Apply `TRIBUTARY_`-prefixed overrides from any key/value source
    pub fn apply_overrides(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                if config_key == "LOG" {
                    continue;
                }
                if let Err(e) = self.set_value(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    /// Set one value by its `SECTION__KEY` path
    pub fn set_value(&mut self, path: &str, value: &str) -> Result<()> {
        match path.to_uppercase().as_str() {
            "RETRIEVAL__RRF_K" => self.retrieval.rrf_k = parse_value(path, value)?,
            "RETRIEVAL__DEFAULT_ALPHA" => self.retrieval.default_alpha = parse_value(path, value)?,
            "RETRIEVAL__BM25_K1" => self.retrieval.bm25_k1 = parse_value(path, value)?,
            "RETRIEVAL__BM25_B" => self.retrieval.bm25_b = parse_value(path, value)?,
            "RETRIEVAL__DEFAULT_VECTOR_LIMIT" => {
                self.retrieval.default_vector_limit = parse_value(path, value)?
            }
            "RETRIEVAL__SEARCH_MULTIPLIER" => {
                self.retrieval.search_multiplier = parse_value(path, value)?
            }
            "RETRIEVAL__SOURCE_RESULT_CAP" => {
                self.retrieval.source_result_cap = parse_value(path, value)?
            }
            "FEDERATION__TIMEOUT_MS" => self.federation.timeout_ms = parse_value(path, value)?,
            "FEDERATION__DEFAULT_LIMIT" => {
                self.federation.default_limit = parse_value(path, value)?
            }
            "FEDERATION__MAX_LIMIT" => self.federation.max_limit = parse_value(path, value)?,
            "FEDERATION__MAX_CONCURRENT_SOURCES" => {
                self.federation.max_concurrent_sources = parse_value(path, value)?
            }
            "MERGE__DEDUP_THRESHOLD" => self.merge.dedup_threshold = parse_value(path, value)?,
            "MERGE__DIVERSITY_BOOST" => self.merge.diversity_boost = parse_value(path, value)?,
            "MERGE__SHINGLE_SIZE" => self.merge.shingle_size = parse_value(path, value)?,
            "RELATIONS__ENABLED" => self.relations.enabled = parse_value(path, value)?,
            "RELATIONS__CONTENT_SIMILARITY_THRESHOLD" => {
                self.relations.content_similarity_threshold = parse_value(path, value)?
            }
            "RELATIONS__TICKET_KEYS" => self.relations.ticket_keys = parse_list(value),
            "RELATIONS__DOC_TYPES" => self.relations.doc_types = parse_list(value),
            "RELATIONS__TEST_PATTERNS_FILE" => {
                self.relations.test_patterns_file = value.to_string()
            }
            "CACHE__ENABLED" => self.cache.enabled = parse_value(path, value)?,
            "CACHE__CAPACITY" => self.cache.capacity = parse_value(path, value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| TributaryError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("tributary").join("config.toml"))
    }
}

fn parse_value<T: FromStr>(path: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| TributaryError::InvalidConfigValue {
            path: path.to_lowercase().replace("__", "."),
            message: format!(
                "Cannot parse '{}' as {}",
                value,
                std::any::type_name::<T>()
            ),
        })
}

/// Comma-separated list, blanks dropped
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
