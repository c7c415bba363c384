//! Integration tests: configuration files, profiles and overrides

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tributary::config::{Config, ConfigValidator};
use tributary::TributaryError;

#[test]
fn test_save_and_reload() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("config.toml");

    let mut config = Config::default();
    config.retrieval.rrf_k = 30.0;
    config.merge.dedup_threshold = 0.9;
    config.relations.ticket_keys = vec!["jira".to_string()];
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.retrieval.rrf_k, 30.0);
    assert_eq!(loaded.merge.dedup_threshold, 0.9);
    assert_eq!(loaded.relations.ticket_keys, vec!["jira".to_string()]);
    assert_eq!(loaded.federation, config.federation);
}

#[test]
fn test_missing_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("absent.toml");

    assert!(matches!(
        Config::load(&path),
        Err(TributaryError::ConfigNotFound { .. })
    ));

    let config = Config::load_or_default(&path).unwrap();
    assert_eq!(config.retrieval, Config::default().retrieval);
}

#[test]
fn test_partial_file_uses_section_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
            [federation]
            timeout_ms = 2500
        "#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.federation.timeout_ms, 2500);
    assert_eq!(config.federation.max_limit, 100);
    assert_eq!(config.retrieval.rrf_k, 60.0);
    assert_eq!(config.meta.schema_version, "1.0.0");
}

#[test]
fn test_profile_from_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
            [profiles.fast]
            timeout_ms = 500
            relations_enabled = false
        "#,
    )
    .unwrap();

    let config = Config::load_with_profile(&path, "fast").unwrap();
    assert_eq!(config.federation.timeout_ms, 500);
    assert!(!config.relations.enabled);

    assert!(Config::load_with_profile(&path, "missing").is_err());
}

#[test]
fn test_invalid_file_reports_all_errors() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
            [retrieval]
            default_alpha = 2.0

            [merge]
            shingle_size = 0
        "#,
    )
    .unwrap();

    match Config::load(&path) {
        Err(TributaryError::ConfigValidation { errors }) => {
            let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
            assert_eq!(paths, vec!["retrieval.default_alpha", "merge.shingle_size"]);
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
}

#[test]
fn test_overrides_then_validate() {
    let mut config = Config::default();
    config.apply_overrides(vec![
        ("TRIBUTARY_MERGE__DIVERSITY_BOOST".to_string(), "0.1".to_string()),
        ("TRIBUTARY_CACHE__ENABLED".to_string(), "false".to_string()),
        ("TRIBUTARY_LOG".to_string(), "debug".to_string()),
        ("UNRELATED".to_string(), "1".to_string()),
    ]);

    assert_eq!(config.merge.diversity_boost, 0.1);
    assert!(!config.cache.enabled);
    assert!(ConfigValidator::validate(&config).is_ok());
}
