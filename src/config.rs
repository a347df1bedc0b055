//! Configuration management for rigchat
//!
//! Parses TOML configuration files and provides typed access to settings.
//! Every section is optional; an empty file yields a local-only setup that
//! talks to Ollama on its default port.

use crate::cache::CacheSettings;
use crate::error::{AppError, AppResult};
use crate::router::{AutoFallback, RouterOptions, RoutingMode, Tier};
use crate::security::ClassificationLevel;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable consulted when `cloud.openrouter_key` is not set
pub const OPENROUTER_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Prefix of the environment variables that override file settings
///
/// Each `RIGRUN_*` variable replaces one key after the file is parsed and
/// before it is validated:
///
/// | Variable | Key |
/// |---|---|
/// | `RIGRUN_CLASSIFICATION` | `security.classification` |
/// | `RIGRUN_PARANOID` | `routing.paranoid` |
/// | `RIGRUN_OFFLINE`, `RIGRUN_NO_NETWORK` | `routing.offline` |
/// | `RIGRUN_MODE` | `routing.mode` |
/// | `RIGRUN_MAX_TIER` | `routing.max_tier` |
/// | `RIGRUN_OLLAMA_URL` | `local.url` |
/// | `RIGRUN_MODEL` | `local.model` |
/// | `RIGRUN_OPENROUTER_KEY` | `cloud.openrouter_key` |
pub const ENV_PREFIX: &str = "RIGRUN_";

/// Upper bound for any backend timeout
const MAX_TIMEOUT_SECONDS: u64 = 600;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub cloud: CloudConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Routing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub mode: RoutingMode,
    /// Most expensive tier the router may pick; omit for the default (opus)
    #[serde(default = "default_max_tier")]
    pub max_tier: Option<Tier>,
    /// Never leave the machine, whatever the classification
    #[serde(default)]
    pub paranoid: bool,
    /// No network beyond a loopback Ollama; implies `paranoid`
    #[serde(default)]
    pub offline: bool,
    #[serde(default)]
    pub auto_prefer_local: bool,
    /// Per-query cost ceiling for auto mode in cents; 0 disables the check
    #[serde(default)]
    pub auto_max_cost_cents: f64,
    #[serde(default)]
    pub auto_fallback: AutoFallback,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            mode: RoutingMode::Auto,
            max_tier: default_max_tier(),
            paranoid: false,
            offline: false,
            auto_prefer_local: false,
            auto_max_cost_cents: 0.0,
            auto_fallback: AutoFallback::Local,
        }
    }
}

fn default_max_tier() -> Option<Tier> {
    Some(Tier::Opus)
}

/// Data classification for the session
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub classification: ClassificationLevel,
}

/// Token batching and render rate
///
/// Validated at parse time: `batch_size` in 1..=1000, `max_fps` in 1..=60.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawStreamingConfig")]
pub struct StreamingConfig {
    batch_size: usize,
    max_fps: u32,
}

#[derive(Deserialize)]
struct RawStreamingConfig {
    #[serde(default = "default_batch_size")]
    batch_size: usize,
    #[serde(default = "default_max_fps")]
    max_fps: u32,
}

impl TryFrom<RawStreamingConfig> for StreamingConfig {
    type Error = AppError;

    fn try_from(raw: RawStreamingConfig) -> Result<Self, Self::Error> {
        Self::new(raw.batch_size, raw.max_fps)
    }
}

impl StreamingConfig {
    pub fn new(batch_size: usize, max_fps: u32) -> AppResult<Self> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(AppError::Config(format!(
                "streaming.batch_size must be between 1 and 1000, got {}",
                batch_size
            )));
        }
        if max_fps == 0 || max_fps > 60 {
            return Err(AppError::Config(format!(
                "streaming.max_fps must be between 1 and 60, got {}",
                max_fps
            )));
        }
        Ok(Self {
            batch_size,
            max_fps,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_fps(&self) -> u32 {
        self.max_fps
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_fps: default_max_fps(),
        }
    }
}

fn default_batch_size() -> usize {
    15
}

fn default_max_fps() -> u32 {
    30
}

/// Local Ollama backend
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalConfig {
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_local_model")]
    pub model: String,
    #[serde(default = "default_local_timeout")]
    pub timeout_seconds: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            url: default_ollama_url(),
            model: default_local_model(),
            timeout_seconds: default_local_timeout(),
        }
    }
}

impl LocalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_local_model() -> String {
    "llama3.2".to_string()
}

fn default_local_timeout() -> u64 {
    120
}

/// OpenRouter backend
#[derive(Clone, Deserialize, Serialize)]
pub struct CloudConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    openrouter_key: Option<String>,
    #[serde(default = "default_cloud_url")]
    pub base_url: String,
    #[serde(default = "default_cloud_timeout")]
    pub timeout_seconds: u64,
}

impl std::fmt::Debug for CloudConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudConfig")
            .field(
                "openrouter_key",
                &self.openrouter_key.as_ref().map(|_| "<redacted>"),
            )
            .field("base_url", &self.base_url)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            openrouter_key: None,
            base_url: default_cloud_url(),
            timeout_seconds: default_cloud_timeout(),
        }
    }
}

impl CloudConfig {
    /// Configured key, falling back to `OPENROUTER_API_KEY`; blank keys count as unset
    pub fn openrouter_key(&self) -> Option<String> {
        self.openrouter_key
            .clone()
            .or_else(|| std::env::var(OPENROUTER_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
    }

    /// Key from the file only, ignoring the environment
    pub fn configured_key(&self) -> Option<&str> {
        self.openrouter_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_cloud_url() -> String {
    crate::backend::openrouter::DEFAULT_BASE_URL.to_string()
}

fn default_cloud_timeout() -> u64 {
    60
}

/// Response cache
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default = "default_similarity")]
    pub similarity_threshold: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: default_cache_ttl(),
            capacity: default_cache_capacity(),
            similarity_threshold: default_similarity(),
        }
    }
}

impl CacheConfig {
    pub fn settings(&self) -> CacheSettings {
        CacheSettings {
            ttl: Duration::from_secs(self.ttl_seconds),
            capacity: self.capacity,
            similarity_threshold: self.similarity_threshold,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    24 * 60 * 60
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_similarity() -> f64 {
    0.85
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file (preserves io::Error context)
        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        // Phase 2: Parse TOML (preserves toml::de::Error context)
        let mut config: Self = toml::from_str(&content).map_err(|source| {
            AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            }
        })?;

        // Phase 3: Environment overrides, then validate the merged result
        config
            .apply_env_overrides()
            .and_then(|()| config.validate())
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Like [`Config::from_file`], but a missing file means defaults
    ///
    /// Environment overrides apply to the defaults too.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        if path.as_ref().exists() {
            return Self::from_file(path);
        }

        tracing::debug!(
            path = %path.as_ref().display(),
            "Config file not found, using defaults"
        );
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `RIGRUN_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> AppResult<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply `RIGRUN_*` overrides using `lookup` in place of the environment
    ///
    /// Empty values are ignored. Classification and tier values must parse;
    /// a typo in `RIGRUN_CLASSIFICATION` is an error rather than a silent
    /// UNCLASSIFIED session.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            let name = format!("{}{}", ENV_PREFIX, suffix);
            lookup(&name)
                .filter(|value| !value.trim().is_empty())
                .map(|value| (name, value))
        };

        if let Some((name, value)) = var("CLASSIFICATION") {
            self.security.classification = value.parse().map_err(|_| {
                AppError::Config(format!("{} '{}' is not a classification level", name, value))
            })?;
        }
        if let Some((_, value)) = var("PARANOID") {
            self.routing.paranoid = env_flag(&value);
        }
        if let Some((_, value)) = var("OFFLINE") {
            self.routing.offline = env_flag(&value);
        }
        if let Some((_, value)) = var("NO_NETWORK") {
            self.routing.offline = env_flag(&value);
        }
        if let Some((_, value)) = var("MODE") {
            self.routing.mode = RoutingMode::from_user_input(&value);
        }
        if let Some((name, value)) = var("MAX_TIER") {
            let tier = value.parse().map_err(|_| {
                AppError::Config(format!("{} '{}' is not a routing tier", name, value))
            })?;
            self.routing.max_tier = Some(tier);
        }
        if let Some((_, value)) = var("OLLAMA_URL") {
            self.local.url = value;
        }
        if let Some((_, value)) = var("MODEL") {
            self.local.model = value;
        }
        if let Some((_, value)) = var("OPENROUTER_KEY") {
            self.cloud.openrouter_key = Some(value);
        }

        Ok(())
    }

    /// Router inputs derived from this configuration
    pub fn router_options(&self) -> RouterOptions {
        RouterOptions::default()
            .with_max_tier(self.routing.max_tier)
            .with_paranoid(self.routing.paranoid || self.routing.offline)
            .with_cloud_key(self.cloud_enabled())
            .with_auto_prefer_local(self.routing.auto_prefer_local)
            .with_auto_max_cost(self.routing.auto_max_cost_cents)
            .with_auto_fallback(self.routing.auto_fallback)
    }

    /// True if a cloud backend may be built: a key is set and offline mode is off
    pub fn cloud_enabled(&self) -> bool {
        !self.routing.offline && self.cloud.openrouter_key().is_some()
    }

    /// Validate configuration after parsing
    ///
    /// Called by `from_file()` and `from_str()`; call it yourself when
    /// building a `Config` by hand.
    pub fn validate(&self) -> AppResult<()> {
        if self.routing.max_tier == Some(Tier::Cache) {
            return Err(AppError::Config(
                "routing.max_tier cannot be 'cache'; use 'local' to keep every query on this machine"
                    .to_string(),
            ));
        }

        let max_cost = self.routing.auto_max_cost_cents;
        if !max_cost.is_finite() || max_cost < 0.0 {
            return Err(AppError::Config(format!(
                "routing.auto_max_cost_cents must be a finite number >= 0, got {}",
                max_cost
            )));
        }

        for (name, url) in [
            ("local.url", &self.local.url),
            ("cloud.base_url", &self.cloud.base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(AppError::Config(format!(
                    "{} '{}' must start with 'http://' or 'https://'",
                    name, url
                )));
            }
        }

        if self.routing.offline && !is_loopback_url(&self.local.url) {
            return Err(AppError::Config(format!(
                "local.url '{}' must point at localhost while routing.offline is set",
                self.local.url
            )));
        }

        if self.local.model.trim().is_empty() {
            return Err(AppError::Config(
                "local.model cannot be empty".to_string(),
            ));
        }

        for (name, timeout) in [
            ("local.timeout_seconds", self.local.timeout_seconds),
            ("cloud.timeout_seconds", self.cloud.timeout_seconds),
        ] {
            if timeout == 0 || timeout > MAX_TIMEOUT_SECONDS {
                return Err(AppError::Config(format!(
                    "{} must be between 1 and {}, got {}",
                    name, MAX_TIMEOUT_SECONDS, timeout
                )));
            }
        }

        let threshold = self.cache.similarity_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(AppError::Config(format!(
                "cache.similarity_threshold must be in (0, 1], got {}",
                threshold
            )));
        }
        if self.cache.enabled && self.cache.ttl_seconds == 0 {
            return Err(AppError::Config(
                "cache.ttl_seconds must be greater than 0 when the cache is enabled".to_string(),
            ));
        }

        let level = self.observability.log_level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(AppError::Config(format!(
                "observability.log_level '{}' is not one of {:?}",
                self.observability.log_level, LOG_LEVELS
            )));
        }

        Ok(())
    }
}

/// "1" or "true" (any case) turns a flag on; anything else turns it off
fn env_flag(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// True for `localhost` and loopback IPv4/IPv6 hosts
fn is_loopback_url(url: &str) -> bool {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return false;
    };
    match parsed.host_str() {
        Some("localhost") => true,
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<std::net::IpAddr>()
            .is_ok_and(|ip| ip.is_loopback()),
        None => false,
    }
}

/// Parses and validates without consulting the environment
impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_CONFIG: &str = r#"
[routing]
mode = "cloud"
max_tier = "sonnet"
auto_prefer_local = true
auto_max_cost_cents = 0.5
auto_fallback = "error"

[security]
classification = "CUI"

[streaming]
batch_size = 10
max_fps = 60

[local]
url = "http://192.168.1.20:11434"
model = "qwen2.5-coder:7b"
timeout_seconds = 90

[cloud]
openrouter_key = "sk-or-test"
timeout_seconds = 30

[cache]
enabled = false
similarity_threshold = 0.9

[observability]
log_level = "debug"
"#;

    #[test]
    fn test_config_from_str_parses_successfully() {
        let config = Config::from_str(TEST_CONFIG).expect("should parse config");
        assert_eq!(config.routing.mode, RoutingMode::Cloud);
        assert_eq!(config.routing.max_tier, Some(Tier::Sonnet));
        assert_eq!(config.routing.auto_fallback, AutoFallback::Error);
        assert_eq!(config.security.classification, ClassificationLevel::Cui);
        assert_eq!(config.streaming.batch_size(), 10);
        assert_eq!(config.streaming.max_fps(), 60);
        assert_eq!(config.local.model, "qwen2.5-coder:7b");
        assert_eq!(config.cloud.configured_key(), Some("sk-or-test"));
        assert!(!config.cache.enabled);
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_str("").expect("empty config is valid");
        assert_eq!(config.routing.mode, RoutingMode::Auto);
        assert_eq!(config.routing.max_tier, Some(Tier::Opus));
        assert_eq!(config.security.classification, ClassificationLevel::Unclassified);
        assert_eq!(config.streaming, StreamingConfig::default());
        assert_eq!(config.local.url, "http://localhost:11434");
        assert_eq!(config.cloud.base_url, "https://openrouter.ai/api/v1");
        assert!(config.cache.enabled);
        assert_eq!(config.cache.capacity, 1000);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_unknown_mode_means_auto() {
        let config = Config::from_str("[routing]\nmode = \"turbo\"").unwrap();
        assert_eq!(config.routing.mode, RoutingMode::Auto);
    }

    #[test]
    fn test_router_options_carry_routing_section() {
        let config = Config::from_str(TEST_CONFIG).unwrap();
        let options = config.router_options();
        assert_eq!(options.max_tier, Some(Tier::Sonnet));
        assert!(options.auto_prefer_local);
        assert!(options.has_cloud_key);
        assert_eq!(options.auto_max_cost_cents, 0.5);
    }

    #[test]
    fn test_streaming_batch_size_zero_rejected_at_parse() {
        let result = Config::from_str("[streaming]\nbatch_size = 0");
        assert!(matches!(result, Err(AppError::ConfigParseFailed { .. })));
    }

    #[test]
    fn test_streaming_fps_above_60_rejected() {
        let err = Config::from_str("[streaming]\nmax_fps = 120").unwrap_err();
        assert!(err.to_string().contains("max_fps"));
    }

    #[test]
    fn test_max_tier_cache_rejected() {
        let err = Config::from_str("[routing]\nmax_tier = \"cache\"").unwrap_err();
        assert!(err.to_string().contains("max_tier"));
    }

    #[test]
    fn test_negative_max_cost_rejected() {
        assert!(Config::from_str("[routing]\nauto_max_cost_cents = -1.0").is_err());
    }

    #[test]
    fn test_invalid_url_rejected() {
        let err = Config::from_str("[local]\nurl = \"localhost:11434\"").unwrap_err();
        assert!(err.to_string().contains("local.url"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(Config::from_str("[cloud]\ntimeout_seconds = 0").is_err());
    }

    #[test]
    fn test_similarity_out_of_range_rejected() {
        assert!(Config::from_str("[cache]\nsimilarity_threshold = 1.5").is_err());
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        assert!(Config::from_str("[observability]\nlog_level = \"loud\"").is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = Config::from_str(TEST_CONFIG).unwrap();
        let debug = format!("{:?}", config.cloud);
        assert!(!debug.contains("sk-or-test"));
    }

    #[test]
    fn test_blank_key_counts_as_unset() {
        let config = Config::from_str("[cloud]\nopenrouter_key = \"  \"").unwrap();
        assert!(config.cloud.configured_key().is_none());
    }
}
