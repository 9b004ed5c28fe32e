// Configuration Module Tests
// Tests for EngineConfig, loading, defaults and validation

use std::fs;

use blockcache_engine::{EngineConfig, PromotionPolicy, PromotionPolicyType};
use tempfile::tempdir;

#[test]
fn test_config_default_values() {
    let config = EngineConfig::default();

    // Cache defaults
    assert_eq!(config.cache.cache_lines, 262_144);
    assert_eq!(config.cache.line_size, 4096);

    // Promotion defaults
    assert_eq!(config.promotion.policy, PromotionPolicyType::Always);
    assert_eq!(config.promotion.nhit.insertion_threshold, 3);
    assert_eq!(config.promotion.nhit.table_capacity, None);

    // Logging defaults
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, "pretty");

    assert!(config.validate().is_ok());
}

#[test]
fn test_occurrence_capacity_follows_cache_lines() {
    let mut config = EngineConfig::default();
    assert_eq!(config.occurrence_capacity(), 262_144);

    config.promotion.nhit.table_capacity = Some(1000);
    assert_eq!(config.occurrence_capacity(), 1000);
}

#[test]
fn test_config_from_file() {
    let temp_config = r#"
cache:
  cache_lines: 8192
  line_size: 65536

promotion:
  policy: "nhit"
  nhit:
    insertion_threshold: 5
    table_capacity: 2048

logging:
  level: "debug"
  format: "json"
"#;

    let dir = tempdir().unwrap();
    let path = dir.path().join("blockcache.yml");
    fs::write(&path, temp_config).unwrap();

    let config = EngineConfig::from_file(&path).unwrap();

    assert_eq!(config.cache.cache_lines, 8192);
    assert_eq!(config.cache.line_size, 65536);
    assert_eq!(config.promotion.policy, PromotionPolicyType::Nhit);
    assert_eq!(config.promotion.nhit.insertion_threshold, 5);
    assert_eq!(config.promotion.nhit.table_capacity, Some(2048));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, "json");

    let policy = PromotionPolicy::init(&config).unwrap();
    assert_eq!(policy.get_param(0).unwrap(), 5);
    assert_eq!(policy.occurrence_table().unwrap().capacity(), 2048);
    policy.deinit();
}

#[test]
fn test_partial_config_uses_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("partial.yml");
    fs::write(&path, "promotion:\n  policy: nhit\n").unwrap();

    let config = EngineConfig::from_file(&path).unwrap();

    assert_eq!(config.promotion.policy, PromotionPolicyType::Nhit);
    assert_eq!(config.promotion.nhit.insertion_threshold, 3);
    assert_eq!(config.cache.line_size, 4096);
}

#[test]
fn test_config_from_nonexistent_file_fails() {
    let result = EngineConfig::from_file("/nonexistent/path/config.yml");
    assert!(result.is_err());
}

#[test]
fn test_config_from_invalid_yaml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("invalid.yml");
    fs::write(&path, "invalid: yaml: content: [[[").unwrap();

    assert!(EngineConfig::from_file(&path).is_err());
}

#[test]
fn test_config_unknown_policy_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("policy.yml");
    fs::write(&path, "promotion:\n  policy: sometimes\n").unwrap();

    assert!(EngineConfig::from_file(&path).is_err());
}

#[test]
fn test_config_file_validation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("zero.yml");
    fs::write(&path, "promotion:\n  nhit:\n    insertion_threshold: 0\n").unwrap();

    let err = EngineConfig::from_file(&path).unwrap_err();
    assert!(err.to_string().contains("insertion_threshold"));
}

#[test]
fn test_validate_rejects_bad_geometry() {
    let mut config = EngineConfig::default();
    config.cache.line_size = 3000;
    assert!(config.validate().unwrap_err().is_configuration());

    let mut config = EngineConfig::default();
    config.cache.line_size = 0;
    assert!(config.validate().is_err());

    let mut config = EngineConfig::default();
    config.cache.cache_lines = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_serialization() {
    let config = EngineConfig::default();

    let yaml = serde_yaml::to_string(&config).unwrap();
    assert!(yaml.contains("policy: always"));

    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("\"insertion_threshold\":3"));
}
