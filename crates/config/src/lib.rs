//! Configuration loading, validation, and management for Parley.
//!
//! Loads configuration from `~/.parley/config.toml` (or the file named by
//! `PARLEY_CONFIG`) with environment variable overrides. Validates all
//! settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.parley/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Ordered provider chain. First entry is tried first.
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,

    /// Per-identity token bucket settings for the chat route
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Context assembly settings
    #[serde(default)]
    pub context: ContextConfig,

    /// Background summarization settings
    #[serde(default)]
    pub summarization: SummarizationConfig,

    /// Chat request handling
    #[serde(default)]
    pub chat: ChatConfig,

    /// Session history backend
    #[serde(default)]
    pub history: HistoryConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("providers", &self.providers)
            .field("rate_limit", &self.rate_limit)
            .field("context", &self.context)
            .field("summarization", &self.summarization)
            .field("chat", &self.chat)
            .field("history", &self.history)
            .field("gateway", &self.gateway)
            .finish()
    }
}

/// Wire protocol an entry speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// `POST /chat/completions` (OpenAI, Groq, xAI, ...)
    OpenaiCompat,
    /// Google Generative Language API
    Gemini,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name reported in results and logs ("openai", "gemini", ...)
    pub name: String,

    #[serde(default = "default_provider_kind")]
    pub kind: ProviderKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable consulted when `api_key` is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Hard per-attempt timeout
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    /// Static trust score reported with this provider's answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("api_key", &redact(&self.api_key))
            .field("api_key_env", &self.api_key_env)
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("confidence", &self.confidence)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            name: name.into(),
            kind,
            api_key: None,
            api_key_env: None,
            api_url: None,
            model: None,
            timeout_secs: default_provider_timeout(),
            confidence: None,
            enabled: true,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }

    fn with_key_env(mut self, var: &str) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    /// Environment variable holding this provider's key: `api_key_env`
    /// when set, otherwise `{NAME}_API_KEY` (e.g. `OPENAI_API_KEY`).
    pub fn key_env_var(&self) -> String {
        match self.api_key_env.as_deref().map(str::trim) {
            Some(var) if !var.is_empty() => var.to_string(),
            _ => {
                let name: String = self
                    .name
                    .trim()
                    .chars()
                    .map(|c| {
                        if c.is_ascii_alphanumeric() {
                            c.to_ascii_uppercase()
                        } else {
                            '_'
                        }
                    })
                    .collect();
                format!("{name}_API_KEY")
            }
        }
    }

    /// The credential from config, falling back to [`key_env_var`](Self::key_env_var).
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                std::env::var(self.key_env_var())
                    .ok()
                    .filter(|k| !k.trim().is_empty())
            })
    }
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::new("openai", ProviderKind::OpenaiCompat).with_key_env("OPENAI_API_KEY"),
        ProviderConfig::new("gemini", ProviderKind::Gemini).with_key_env("GEMINI_API_KEY"),
        ProviderConfig::new("groq", ProviderKind::OpenaiCompat).with_key_env("GROQ_API_KEY"),
        ProviderConfig::new("xai", ProviderKind::OpenaiCompat).with_key_env("XAI_API_KEY"),
    ]
}
fn default_provider_kind() -> ProviderKind {
    ProviderKind::OpenaiCompat
}
fn default_provider_timeout() -> u64 {
    30
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_capacity")]
    pub capacity: f64,

    #[serde(default = "default_refill_per_sec")]
    pub refill_per_sec: f64,

    /// Bucket count above which idle buckets are pruned
    #[serde(default = "default_max_buckets")]
    pub max_buckets: usize,
}

fn default_capacity() -> f64 {
    10.0
}
fn default_refill_per_sec() -> f64 {
    0.2
}
fn default_max_buckets() -> usize {
    10_000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_per_sec: default_refill_per_sec(),
            max_buckets: default_max_buckets(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Most recent raw messages always kept verbatim
    #[serde(default = "default_last_n")]
    pub last_n: usize,

    /// Approximate token budget (1 token ~ 4 chars)
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Drop oldest summaries, then oldest raw messages, to fit the budget
    #[serde(default)]
    pub enforce_budget: bool,
}

fn default_last_n() -> usize {
    20
}
fn default_token_budget() -> usize {
    3000
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            last_n: default_last_n(),
            token_budget: default_token_budget(),
            enforce_budget: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Raw message count above which a summary is dispatched
    #[serde(default = "default_threshold")]
    pub threshold: usize,

    /// Newest raw messages never summarized
    #[serde(default = "default_last_n")]
    pub keep_last_n: usize,

    /// Start candidates after the highest summarized index instead of 0
    #[serde(default)]
    pub incremental: bool,

    /// Remote summarization endpoint. Local provider chain when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_summarization_timeout")]
    pub timeout_secs: u64,
}

fn default_threshold() -> usize {
    50
}
fn default_summarization_timeout() -> u64 {
    60
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: default_threshold(),
            keep_last_n: default_last_n(),
            incremental: false,
            endpoint: None,
            timeout_secs: default_summarization_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Store the latest user message before answering
    #[serde(default = "default_true")]
    pub persist_user_messages: bool,

    /// Sanitizer cap on forwarded messages
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Persona used when a request names none
    #[serde(default = "default_active_role")]
    pub default_role: String,
}

fn default_max_messages() -> usize {
    200
}
fn default_active_role() -> String {
    "business_advisor".into()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            persist_user_messages: true,
            max_messages: default_max_messages(),
            default_role: default_active_role(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// "memory" or "sqlite"
    #[serde(default = "default_history_backend")]
    pub backend: String,

    /// SQLite database file. Defaults to `~/.parley/history.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn default_history_backend() -> String {
    "sqlite".into()
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: default_history_backend(),
            path: None,
        }
    }
}

impl HistoryConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| AppConfig::config_dir().join("history.db"))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Treat unauthenticated callers as the "anonymous" identity
    #[serde(default)]
    pub allow_anonymous: bool,

    /// Browser origins allowed by CORS
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Bearer token -> identity
    #[serde(default)]
    pub api_tokens: HashMap<String, String>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let identities: Vec<&String> = self.api_tokens.values().collect();
        f.debug_struct("GatewayConfig")
            .field("port", &self.port)
            .field("host", &self.host)
            .field("api_tokens", &format!("[REDACTED] for {identities:?}"))
            .field("allow_anonymous", &self.allow_anonymous)
            .field("cors_origins", &self.cors_origins)
            .finish()
    }
}

fn default_port() -> u16 {
    42618
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".into()]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            api_tokens: HashMap::new(),
            allow_anonymous: false,
            cors_origins: default_cors_origins(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `PARLEY_CONFIG` or `~/.parley/config.toml`.
    ///
    /// Environment overrides (highest priority):
    /// - `PARLEY_HOST`, `PARLEY_PORT` for the gateway bind address
    /// - each provider's `api_key_env` (resolved lazily when the chain is built)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("PARLEY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));
        let mut config = Self::load_from(&config_path)?;

        if let Ok(host) = std::env::var("PARLEY_HOST") {
            config.gateway.host = host;
        }
        if let Ok(port) = std::env::var("PARLEY_PORT") {
            config.gateway.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("PARLEY_PORT is not a valid port: {port}"))
            })?;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".parley")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "provider name must not be empty".into(),
                ));
            }
            if !names.insert(provider.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate provider '{}'",
                    provider.name
                )));
            }
            if provider.timeout_secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "provider '{}': timeout_secs must be > 0",
                    provider.name
                )));
            }
            if provider.confidence.is_some_and(|c| c > 100) {
                return Err(ConfigError::ValidationError(format!(
                    "provider '{}': confidence must be between 0 and 100",
                    provider.name
                )));
            }
        }

        if !(self.rate_limit.capacity >= 1.0 && self.rate_limit.capacity.is_finite()) {
            return Err(ConfigError::ValidationError(
                "rate_limit.capacity must be >= 1".into(),
            ));
        }
        if !(self.rate_limit.refill_per_sec > 0.0 && self.rate_limit.refill_per_sec.is_finite()) {
            return Err(ConfigError::ValidationError(
                "rate_limit.refill_per_sec must be > 0".into(),
            ));
        }

        if self.context.last_n == 0 {
            return Err(ConfigError::ValidationError(
                "context.last_n must be > 0".into(),
            ));
        }
        if self.chat.max_messages == 0 {
            return Err(ConfigError::ValidationError(
                "chat.max_messages must be > 0".into(),
            ));
        }

        if self.summarization.threshold < self.summarization.keep_last_n {
            return Err(ConfigError::ValidationError(
                "summarization.threshold must be >= summarization.keep_last_n".into(),
            ));
        }
        if self.summarization.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "summarization.timeout_secs must be > 0".into(),
            ));
        }

        match self.history.backend.as_str() {
            "memory" | "sqlite" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown history backend '{other}' (expected memory or sqlite)"
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            rate_limit: RateLimitConfig::default(),
            context: ContextConfig::default(),
            summarization: SummarizationConfig::default(),
            chat: ChatConfig::default(),
            history: HistoryConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway.port, 42618);
        assert_eq!(config.rate_limit.capacity, 10.0);
        assert_eq!(config.context.token_budget, 3000);
        assert_eq!(config.summarization.threshold, 50);
    }

    #[test]
    fn default_chain_order() {
        let names: Vec<_> = AppConfig::default()
            .providers
            .iter()
            .map(|p| p.name.clone())
            .collect();
        assert_eq!(names, vec!["openai", "gemini", "groq", "xai"]);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.providers.len(), config.providers.len());
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(parsed.providers[1].kind, ProviderKind::Gemini);
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut config = AppConfig::default();
        config.providers[0].timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn duplicate_provider_rejected() {
        let mut config = AppConfig::default();
        config.providers.push(ProviderConfig::new("openai", ProviderKind::OpenaiCompat));
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_rate_limit_rejected() {
        let mut config = AppConfig::default();
        config.rate_limit.refill_per_sec = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.rate_limit.capacity = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn threshold_below_keep_last_n_rejected() {
        let mut config = AppConfig::default();
        config.summarization.threshold = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_backend_rejected() {
        let mut config = AppConfig::default();
        config.history.backend = "postgres".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().providers.len(), 4);
    }

    #[test]
    fn load_from_file_with_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[[providers]]
name = "groq"
api_key = "gsk-test"
timeout_secs = 5
confidence = 70

[rate_limit]
capacity = 3

[context]
enforce_budget = true

[gateway.api_tokens]
"tok-alice" = "alice"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].timeout_secs, 5);
        assert_eq!(config.providers[0].confidence, Some(70));
        assert_eq!(config.rate_limit.capacity, 3.0);
        assert_eq!(config.rate_limit.refill_per_sec, 0.2);
        assert!(config.context.enforce_budget);
        assert_eq!(config.gateway.api_tokens.get("tok-alice").unwrap(), "alice");
    }

    #[test]
    fn invalid_file_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "providers = 7").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = AppConfig::default();
        config.providers[0].api_key = Some("sk-very-secret".into());
        config
            .gateway
            .api_tokens
            .insert("tok-secret".into(), "alice".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(!debug.contains("tok-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn resolve_api_key_prefers_inline_key() {
        let mut provider = ProviderConfig::new("openai", ProviderKind::OpenaiCompat)
            .with_key_env("PARLEY_TEST_UNSET_KEY_VAR");
        assert!(provider.resolve_api_key().is_none());
        provider.api_key = Some("sk-inline".into());
        assert_eq!(provider.resolve_api_key().as_deref(), Some("sk-inline"));
    }

    #[test]
    fn explicit_provider_reads_conventional_env_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[[providers]]\nname = \"parley-test-env\"\n",
        )
        .unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        let provider = &config.providers[0];
        assert_eq!(provider.key_env_var(), "PARLEY_TEST_ENV_API_KEY");

        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("PARLEY_TEST_ENV_API_KEY", "sk-from-env") };
        assert_eq!(provider.resolve_api_key().as_deref(), Some("sk-from-env"));
        unsafe { std::env::remove_var("PARLEY_TEST_ENV_API_KEY") };
        assert!(provider.resolve_api_key().is_none());
    }

    #[test]
    fn explicit_key_env_wins_over_convention() {
        let provider = ProviderConfig::new("openai", ProviderKind::OpenaiCompat)
            .with_key_env("PARLEY_CUSTOM_OPENAI_KEY");
        assert_eq!(provider.key_env_var(), "PARLEY_CUSTOM_OPENAI_KEY");
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gemini"));
        assert!(toml_str.contains("42618"));
        assert!(toml_str.contains("refill_per_sec"));
    }
}
