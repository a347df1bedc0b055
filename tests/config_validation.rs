//! Integration tests for configuration validation
//!
//! Verifies that invalid configurations are rejected at startup
//! (`Config::from_file`) rather than surfacing mid-session. Tests the full
//! path: file → parse → validate.

use rigchat::config::Config;
use rigchat::router::{RoutingMode, Tier};
use rigchat::security::ClassificationLevel;
use std::collections::HashMap;
use std::io::Write;
use std::str::FromStr;
use std::time::Duration;
use tempfile::NamedTempFile;

/// Helper to create a temporary config file with given TOML content
fn create_temp_config(toml_content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
    temp_file
        .write_all(toml_content.as_bytes())
        .expect("Failed to write temp file");
    temp_file.flush().expect("Failed to flush temp file");
    temp_file
}

fn rejection(toml_content: &str) -> String {
    let temp_file = create_temp_config(toml_content);
    match Config::from_file(temp_file.path()) {
        Ok(_) => panic!("config should be rejected:\n{}", toml_content),
        Err(e) => e.to_string(),
    }
}

#[test]
fn test_empty_file_uses_defaults() {
    let temp_file = create_temp_config("");
    let config = Config::from_file(temp_file.path()).expect("empty config is valid");

    assert_eq!(config.local.url, "http://localhost:11434");
    assert_eq!(config.local.timeout(), Duration::from_secs(120));
    assert_eq!(config.cloud.timeout(), Duration::from_secs(60));
    assert_eq!(config.routing.max_tier, Some(Tier::Opus));
    assert!(config.cache.enabled);
}

#[test]
fn test_load_or_default_without_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = Config::load_or_default(dir.path().join("missing.toml"))
        .expect("missing file means defaults");
    assert_eq!(config.observability.log_level, "info");
}

#[test]
fn test_load_or_default_still_validates_existing_file() {
    let temp_file = create_temp_config("[observability]\nlog_level = \"chatty\"\n");
    assert!(Config::load_or_default(temp_file.path()).is_err());
}

#[test]
fn test_rejects_cache_as_max_tier() {
    let msg = rejection("[routing]\nmax_tier = \"cache\"\n");
    assert!(msg.contains("max_tier"), "got: {}", msg);
}

#[test]
fn test_rejects_negative_cost_ceiling() {
    let msg = rejection("[routing]\nauto_max_cost_cents = -1.0\n");
    assert!(msg.contains("auto_max_cost_cents"), "got: {}", msg);
}

#[test]
fn test_rejects_cloud_url_without_scheme() {
    let msg = rejection("[cloud]\nbase_url = \"openrouter.ai/api/v1\"\n");
    assert!(msg.contains("cloud.base_url"), "got: {}", msg);
}

#[test]
fn test_rejects_blank_local_model() {
    let msg = rejection("[local]\nmodel = \"   \"\n");
    assert!(msg.contains("local.model"), "got: {}", msg);
}

#[test]
fn test_rejects_out_of_range_timeouts() {
    let msg = rejection("[local]\ntimeout_seconds = 0\n");
    assert!(msg.contains("local.timeout_seconds"), "got: {}", msg);

    let msg = rejection("[cloud]\ntimeout_seconds = 601\n");
    assert!(msg.contains("cloud.timeout_seconds"), "got: {}", msg);
}

#[test]
fn test_rejects_similarity_threshold_outside_unit_interval() {
    for value in ["0.0", "1.5", "-0.2"] {
        let msg = rejection(&format!("[cache]\nsimilarity_threshold = {}\n", value));
        assert!(msg.contains("similarity_threshold"), "got: {}", msg);
    }
}

#[test]
fn test_zero_ttl_only_matters_when_cache_enabled() {
    let msg = rejection("[cache]\nttl_seconds = 0\n");
    assert!(msg.contains("ttl_seconds"), "got: {}", msg);

    let temp_file = create_temp_config("[cache]\nenabled = false\nttl_seconds = 0\n");
    assert!(Config::from_file(temp_file.path()).is_ok());
}

#[test]
fn test_log_level_is_case_insensitive() {
    let temp_file = create_temp_config("[observability]\nlog_level = \"DEBUG\"\n");
    assert!(Config::from_file(temp_file.path()).is_ok());
}

#[test]
fn test_cache_settings_follow_config() {
    let temp_file = create_temp_config(
        "[cache]\nttl_seconds = 60\ncapacity = 5\nsimilarity_threshold = 0.9\n",
    );
    let config = Config::from_file(temp_file.path()).unwrap();
    let settings = config.cache.settings();
    assert_eq!(settings.ttl, Duration::from_secs(60));
    assert_eq!(settings.capacity, 5);
    assert_eq!(settings.similarity_threshold, 0.9);
}

#[test]
fn test_debug_output_redacts_cloud_key() {
    let temp_file = create_temp_config("[cloud]\nopenrouter_key = \"sk-or-very-secret\"\n");
    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.cloud.configured_key(), Some("sk-or-very-secret"));
    let debug = format!("{:?}", config);
    assert!(!debug.contains("sk-or-very-secret"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Classification spellings
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_classification_accepts_command_line_spellings() {
    let cases = [
        ("SECRET", ClassificationLevel::Secret),
        ("secret", ClassificationLevel::Secret),
        ("Secret", ClassificationLevel::Secret),
        ("TS", ClassificationLevel::TopSecret),
        ("top secret", ClassificationLevel::TopSecret),
        ("TOP_SECRET", ClassificationLevel::TopSecret),
        ("cui", ClassificationLevel::Cui),
    ];
    for (spelling, expected) in cases {
        let temp_file = create_temp_config(&format!(
            "[security]\nclassification = \"{}\"\n",
            spelling
        ));
        let config = Config::from_file(temp_file.path())
            .unwrap_or_else(|e| panic!("'{}' should parse: {}", spelling, e));
        assert_eq!(config.security.classification, expected, "spelling '{}'", spelling);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Offline mode and RIGRUN_* overrides
// ─────────────────────────────────────────────────────────────────────────────

fn overrides(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn apply(config: &mut Config, vars: &HashMap<String, String>) -> rigchat::error::AppResult<()> {
    config.apply_overrides_from(|name| vars.get(name).cloned())
}

#[test]
fn test_offline_folds_into_paranoid_and_disables_cloud() {
    let config = Config::from_str(
        "[routing]\noffline = true\n\n[cloud]\nopenrouter_key = \"sk-or-test\"\n",
    )
    .unwrap();

    assert!(!config.routing.paranoid);
    assert!(config.router_options().paranoid);
    assert!(!config.router_options().has_cloud_key);
    assert!(!config.cloud_enabled());
}

#[test]
fn test_offline_requires_loopback_ollama() {
    for url in ["http://localhost:11434", "http://127.0.0.1:11434", "http://[::1]:11434"] {
        let toml = format!("[routing]\noffline = true\n\n[local]\nurl = \"{}\"\n", url);
        assert!(Config::from_str(&toml).is_ok(), "{} is loopback", url);
    }

    let msg = rejection("[routing]\noffline = true\n\n[local]\nurl = \"http://10.0.0.5:11434\"\n");
    assert!(msg.contains("local.url"), "got: {}", msg);
}

#[test]
fn test_env_overrides_replace_file_values() {
    let mut config = Config::default();
    let vars = overrides(&[
        ("RIGRUN_CLASSIFICATION", "secret"),
        ("RIGRUN_PARANOID", "TRUE"),
        ("RIGRUN_MODE", "cloud"),
        ("RIGRUN_MAX_TIER", "sonnet"),
        ("RIGRUN_OLLAMA_URL", "http://127.0.0.1:11500"),
        ("RIGRUN_MODEL", "qwen2.5-coder:7b"),
        ("RIGRUN_OPENROUTER_KEY", "sk-or-env"),
    ]);
    apply(&mut config, &vars).unwrap();

    assert_eq!(config.security.classification, ClassificationLevel::Secret);
    assert!(config.routing.paranoid);
    assert_eq!(config.routing.mode, RoutingMode::Cloud);
    assert_eq!(config.routing.max_tier, Some(Tier::Sonnet));
    assert_eq!(config.local.url, "http://127.0.0.1:11500");
    assert_eq!(config.local.model, "qwen2.5-coder:7b");
    assert_eq!(config.cloud.configured_key(), Some("sk-or-env"));
}

#[test]
fn test_env_offline_and_no_network_aliases() {
    let mut config = Config::default();
    apply(&mut config, &overrides(&[("RIGRUN_OFFLINE", "1")])).unwrap();
    assert!(config.routing.offline);

    let mut config = Config::default();
    apply(&mut config, &overrides(&[("RIGRUN_NO_NETWORK", "true")])).unwrap();
    assert!(config.routing.offline);

    // Anything other than 1/true switches the flag off
    let mut config = Config::from_str("[routing]\nparanoid = true\n").unwrap();
    apply(&mut config, &overrides(&[("RIGRUN_PARANOID", "yes")])).unwrap();
    assert!(!config.routing.paranoid);
}

#[test]
fn test_empty_env_values_are_ignored() {
    let mut config = Config::from_str("[security]\nclassification = \"CUI\"\n").unwrap();
    apply(
        &mut config,
        &overrides(&[("RIGRUN_CLASSIFICATION", "  "), ("RIGRUN_MODE", "")]),
    )
    .unwrap();
    assert_eq!(config.security.classification, ClassificationLevel::Cui);
    assert_eq!(config.routing.mode, RoutingMode::Auto);
}

#[test]
fn test_unparseable_env_classification_is_an_error() {
    let mut config = Config::default();
    let err = apply(&mut config, &overrides(&[("RIGRUN_CLASSIFICATION", "SECRETT")]))
        .expect_err("a typo must not leave the session unclassified");
    assert!(err.to_string().contains("RIGRUN_CLASSIFICATION"), "got: {}", err);
    assert_eq!(config.security.classification, ClassificationLevel::Unclassified);

    let err = apply(&mut config, &overrides(&[("RIGRUN_MAX_TIER", "platinum")])).unwrap_err();
    assert!(err.to_string().contains("RIGRUN_MAX_TIER"), "got: {}", err);
}
