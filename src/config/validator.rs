use crate::config::Config;
use crate::error::{Result, TributaryError, ValidationError};

const SCHEMA_VERSION: &str = "1.0.0";

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, reporting every problem at once
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        // Validate schema version
        Self::validate_schema_version(config, &mut errors);

        // Validate retrieval settings
        Self::validate_retrieval(config, &mut errors);

        // Validate federation settings
        Self::validate_federation(config, &mut errors);

        // Validate merge settings
        Self::validate_merge(config, &mut errors);

        // Validate relationship settings
        Self::validate_relations(config, &mut errors);

        if config.cache.enabled && config.cache.capacity == 0 {
            errors.push(ValidationError::new(
                "cache.capacity",
                "Cache capacity must be greater than 0 when the cache is enabled",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TributaryError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if !(retrieval.rrf_k > 0.0) || !retrieval.rrf_k.is_finite() {
            errors.push(ValidationError::new(
                "retrieval.rrf_k",
                format!("RRF constant must be a positive number, got {}", retrieval.rrf_k),
            ));
        }

        Self::check_unit_interval(
            "retrieval.default_alpha",
            retrieval.default_alpha,
            errors,
        );
        Self::check_unit_interval("retrieval.bm25_b", retrieval.bm25_b, errors);

        if !(retrieval.bm25_k1 >= 0.0) {
            errors.push(ValidationError::new(
                "retrieval.bm25_k1",
                format!("bm25_k1 must be non-negative, got {}", retrieval.bm25_k1),
            ));
        }

        for (path, value) in [
            ("retrieval.default_vector_limit", retrieval.default_vector_limit),
            ("retrieval.search_multiplier", retrieval.search_multiplier),
            ("retrieval.source_result_cap", retrieval.source_result_cap),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(path, "Must be greater than 0"));
            }
        }
    }

    fn validate_federation(config: &Config, errors: &mut Vec<ValidationError>) {
        let federation = &config.federation;

        if federation.timeout_ms == 0 {
            errors.push(ValidationError::new(
                "federation.timeout_ms",
                "Timeout must be greater than 0",
            ));
        }

        if federation.max_limit == 0 {
            errors.push(ValidationError::new(
                "federation.max_limit",
                "Maximum page size must be greater than 0",
            ));
        }

        if federation.default_limit == 0 || federation.default_limit > federation.max_limit {
            errors.push(ValidationError::new(
                "federation.default_limit",
                format!(
                    "Default page size must be in 1..={}, got {}",
                    federation.max_limit, federation.default_limit
                ),
            ));
        }

        if federation.max_concurrent_sources == 0 {
            errors.push(ValidationError::new(
                "federation.max_concurrent_sources",
                "Must allow at least one concurrent source",
            ));
        }
    }

    fn validate_merge(config: &Config, errors: &mut Vec<ValidationError>) {
        Self::check_unit_interval("merge.dedup_threshold", config.merge.dedup_threshold, errors);
        Self::check_unit_interval("merge.diversity_boost", config.merge.diversity_boost, errors);

        if config.merge.shingle_size == 0 {
            errors.push(ValidationError::new(
                "merge.shingle_size",
                "Shingle size must be greater than 0",
            ));
        }
    }

    fn validate_relations(config: &Config, errors: &mut Vec<ValidationError>) {
        Self::check_unit_interval(
            "relations.content_similarity_threshold",
            config.relations.content_similarity_threshold,
            errors,
        );

        if config.relations.ticket_keys.iter().any(|k| k.trim().is_empty()) {
            errors.push(ValidationError::new(
                "relations.ticket_keys",
                "Ticket keys cannot be empty strings",
            ));
        }
    }

    fn check_unit_interval(path: &str, value: f32, errors: &mut Vec<ValidationError>) {
        if !(0.0..=1.0).contains(&value) {
            errors.push(ValidationError::new(
                path,
                format!("Must be between 0.0 and 1.0, got {}", value),
            ));
        }
    }
}
