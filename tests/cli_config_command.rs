//! Integration tests for CLI config command
//!
//! Tests file I/O operations for the `rigchat config` subcommand.
//! Verifies template generation, file writing, and round-tripping through
//! `Config::from_file`.

use rigchat::cli::generate_config_template;
use rigchat::config::Config;
use rigchat::router::{AutoFallback, RoutingMode, Tier};
use rigchat::security::ClassificationLevel;
use std::fs;
use tempfile::TempDir;

/// Helper to create temporary directory for file operations
fn create_temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

// ─────────────────────────────────────────────────────────────────────────────
// Template Content Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_generated_template_creates_valid_config_file() {
    let temp_dir = create_temp_dir();
    let config_path = temp_dir.path().join("config.toml");

    fs::write(&config_path, generate_config_template()).expect("Failed to write template");

    let config =
        Config::from_file(&config_path).expect("Generated template should load as valid Config");

    assert_eq!(config.routing.mode, RoutingMode::Auto);
    assert_eq!(config.security.classification, ClassificationLevel::Unclassified);
    assert!(config.cache.enabled);
}

#[test]
fn test_template_file_content_matches_generation() {
    let temp_dir = create_temp_dir();
    let config_path = temp_dir.path().join("config.toml");

    let template = generate_config_template();
    fs::write(&config_path, template).expect("Failed to write template");

    let content = fs::read_to_string(&config_path).expect("Failed to read back");
    assert_eq!(content, template);
}

#[test]
fn test_template_includes_documentation() {
    let template = generate_config_template();

    assert!(template.contains("# "), "Template should have comments");
    assert!(template.contains("rigchat"), "Template should have header");
    assert!(
        template.contains("OPENROUTER_API_KEY"),
        "Template should document the key fallback"
    );
    assert!(
        template.contains("TOP SECRET"),
        "Template should list classification levels"
    );
}

#[test]
fn test_template_leaves_cloud_key_unset() {
    let config: Config = generate_config_template().parse().expect("valid template");
    assert!(config.cloud.configured_key().is_none());
}

// ─────────────────────────────────────────────────────────────────────────────
// File Operation Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_write_to_nonexistent_parent_fails() {
    let temp_dir = create_temp_dir();
    let bad_path = temp_dir.path().join("nonexistent").join("config.toml");

    let result = fs::write(&bad_path, generate_config_template());
    assert!(result.is_err());
    assert_eq!(result.unwrap_err().kind(), std::io::ErrorKind::NotFound);
}

#[test]
fn test_template_roundtrip_preserves_config() {
    let temp_dir = create_temp_dir();
    let config_path = temp_dir.path().join("config.toml");

    fs::write(&config_path, generate_config_template()).expect("Failed to write template");
    let config = Config::from_file(&config_path).expect("Failed to load config");

    assert_eq!(config.routing.max_tier, Some(Tier::Opus));
    assert!(!config.routing.paranoid);
    assert_eq!(config.routing.auto_fallback, AutoFallback::Local);
    assert_eq!(config.streaming.batch_size(), 15);
    assert_eq!(config.streaming.max_fps(), 30);
    assert_eq!(config.local.url, "http://localhost:11434");
    assert_eq!(config.local.model, "llama3.2");
    assert_eq!(config.cloud.base_url, "https://openrouter.ai/api/v1");
    assert_eq!(config.cache.capacity, 1000);
    assert_eq!(config.observability.log_level, "info");
}

#[test]
fn test_template_matches_built_in_defaults() {
    let from_template: Config = generate_config_template().parse().expect("valid template");
    let defaults = Config::default();

    assert_eq!(from_template.routing.mode, defaults.routing.mode);
    assert_eq!(from_template.routing.max_tier, defaults.routing.max_tier);
    assert_eq!(from_template.local.url, defaults.local.url);
    assert_eq!(from_template.local.timeout_seconds, defaults.local.timeout_seconds);
    assert_eq!(from_template.cache.ttl_seconds, defaults.cache.ttl_seconds);
    assert_eq!(
        from_template.cache.similarity_threshold,
        defaults.cache.similarity_threshold
    );
}
