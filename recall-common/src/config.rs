//! Configuration management for the Recall service.
//!
//! The service reads a single configuration file at `~/.recall/config.json`.
//! Every section is optional; a missing file yields the defaults.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (RECALL_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `RECALL_BIND_ADDRESS` → network.bind
//! - `RECALL_PORT` → network.port
//! - `RECALL_AUTH_TOKEN` → auth.token
//! - `RECALL_DATA_DIR` → memory.data_dir
//! - `RECALL_EMBEDDING_URL` → embedding.base_url
//! - `RECALL_EMBEDDING_MODEL` → embedding.model
//! - `RECALL_EMBEDDING_API_KEY` (or `OPENAI_API_KEY`) → embedding.api_key
//! - `RECALL_LOG_LEVEL` → observability.log_level

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".recall"),
        |dirs| dirs.home_dir().join(".recall"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Network Configuration
// ============================================================================

/// Listener configuration for the HTTP transport.
///
/// Default is `127.0.0.1:9004` (local only). Set `bind` to `0.0.0.0` to
/// allow remote access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    9004
}

// ============================================================================
// Auth Configuration
// ============================================================================

/// Shared-secret header authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Header carrying the shared secret
    #[serde(default = "default_auth_header")]
    pub header: String,

    /// The shared secret itself
    #[serde(default)]
    pub token: Option<String>,

    /// Serve without a token configured (local development only)
    #[serde(default)]
    pub allow_anonymous: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            header: default_auth_header(),
            token: None,
            allow_anonymous: false,
        }
    }
}

fn default_auth_header() -> String {
    "X-Auth".into()
}

// ============================================================================
// Memory Configuration
// ============================================================================

/// Memory store sizing and persistence layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Directory holding both persisted artifacts
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Vector index blob file name (relative to `data_dir`)
    #[serde(default = "default_index_file")]
    pub index_file: String,

    /// Entry table document file name (relative to `data_dir`)
    #[serde(default = "default_entries_file")]
    pub entries_file: String,

    /// Embedding dimensionality, fixed for the lifetime of the index
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Number of most recent entries kept in short-term memory
    #[serde(default = "default_short_term_capacity")]
    pub short_term_capacity: usize,

    /// Seconds between background flush checks
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            index_file: default_index_file(),
            entries_file: default_entries_file(),
            dimension: default_dimension(),
            short_term_capacity: default_short_term_capacity(),
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

impl MemoryConfig {
    /// Memory config rooted at `dir`, defaults elsewhere.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: dir.as_ref().to_string_lossy().into_owned(),
            ..Self::default()
        }
    }

    /// Full path of the vector index blob.
    pub fn index_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(&self.index_file)
    }

    /// Full path of the entry table document.
    pub fn entries_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join(&self.entries_file)
    }
}

fn default_data_dir() -> String {
    ".".into()
}

fn default_index_file() -> String {
    "memory_index.bin".into()
}

fn default_entries_file() -> String {
    "memory_data.json".into()
}

fn default_dimension() -> usize {
    768
}

fn default_short_term_capacity() -> usize {
    50
}

fn default_flush_interval_secs() -> u64 {
    10
}

// ============================================================================
// Retrieval Configuration
// ============================================================================

/// Relevance ranking policy for semantic retrieval.
///
/// Thresholds are cosine distances (`1 - cosine similarity`), so smaller
/// is stricter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Maximum distance a candidate may have to be admitted
    #[serde(default = "default_base_threshold")]
    pub base_threshold: f32,

    /// Multiplier bounding the single relaxation step
    #[serde(default = "default_relax_factor")]
    pub relax_factor: f32,

    /// Hard ceiling the relaxed threshold never exceeds
    #[serde(default = "default_max_threshold")]
    pub max_threshold: f32,

    /// Candidates fetched per requested result
    #[serde(default = "default_oversample_factor")]
    pub oversample_factor: usize,

    /// `k` used by the transport when the caller omits it
    #[serde(default = "default_k")]
    pub default_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            base_threshold: default_base_threshold(),
            relax_factor: default_relax_factor(),
            max_threshold: default_max_threshold(),
            oversample_factor: default_oversample_factor(),
            default_k: default_k(),
        }
    }
}

fn default_base_threshold() -> f32 {
    0.75
}

fn default_relax_factor() -> f32 {
    1.2
}

fn default_max_threshold() -> f32 {
    0.9
}

fn default_oversample_factor() -> usize {
    5
}

fn default_k() -> usize {
    5
}

// ============================================================================
// Embedding Configuration
// ============================================================================

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider kind: "openai" (any OpenAI-compatible endpoint) or "noop"
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Base URL of the embeddings API (without the `/embeddings` suffix)
    #[serde(default = "default_embedding_url")]
    pub base_url: String,

    /// Model name sent with each request
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Bearer token, if the endpoint requires one
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-call timeout; expiry counts as an embedding failure
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Prefix applied to search queries
    #[serde(default = "default_query_prefix")]
    pub query_prefix: String,

    /// Prefix applied to stored documents
    #[serde(default = "default_document_prefix")]
    pub document_prefix: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            base_url: default_embedding_url(),
            model: default_embedding_model(),
            api_key: None,
            timeout_secs: default_embedding_timeout(),
            query_prefix: default_query_prefix(),
            document_prefix: default_document_prefix(),
        }
    }
}

fn default_embedding_provider() -> String {
    "openai".into()
}

fn default_embedding_url() -> String {
    "http://127.0.0.1:8080/v1".into()
}

fn default_embedding_model() -> String {
    "nomic-embed-text-v2-moe".into()
}

fn default_embedding_timeout() -> u64 {
    30
}

fn default_query_prefix() -> String {
    "search_query: ".into()
}

fn default_document_prefix() -> String {
    "search_document: ".into()
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Enable per-request tracing spans
    #[serde(default = "default_true")]
    pub tracing: bool,

    /// Additional module targets to pin at `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            tracing: true,
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// JSON Schema reference
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides applied.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = var("RECALL_BIND_ADDRESS") {
            self.network.bind = bind;
        }
        if let Some(port) = var("RECALL_PORT") {
            if let Ok(p) = port.parse() {
                self.network.port = p;
            }
        }

        if let Some(token) = var("RECALL_AUTH_TOKEN") {
            self.auth.token = Some(token);
        }

        if let Some(dir) = var("RECALL_DATA_DIR") {
            self.memory.data_dir = dir;
        }

        if let Some(url) = var("RECALL_EMBEDDING_URL") {
            self.embedding.base_url = url;
        }
        if let Some(model) = var("RECALL_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(key) = var("RECALL_EMBEDDING_API_KEY").or_else(|| var("OPENAI_API_KEY")) {
            self.embedding.api_key = Some(key);
        }

        if let Some(level) = var("RECALL_LOG_LEVEL") {
            self.observability.log_level = level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.network.port, 9004);
        assert_eq!(config.auth.header, "X-Auth");
        assert_eq!(config.memory.dimension, 768);
        assert_eq!(config.memory.short_term_capacity, 50);
        assert_eq!(config.memory.flush_interval_secs, 10);
        assert_eq!(config.retrieval.oversample_factor, 5);
        assert_eq!(config.retrieval.default_k, 5);
        assert!((config.retrieval.base_threshold - 0.75).abs() < f32::EPSILON);
        assert_eq!(config.embedding.query_prefix, "search_query: ");
        assert_eq!(config.embedding.document_prefix, "search_document: ");
    }

    #[test]
    fn empty_document_parses_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.memory.entries_file, "memory_data.json");
        assert_eq!(config.observability.log_format, "pretty");
    }

    #[test]
    fn partial_sections_keep_field_defaults() {
        let config: Config = serde_json::from_str(
            r#"{ "memory": { "dimension": 384 }, "observability": { "level": "debug" } }"#,
        )
        .unwrap();
        assert_eq!(config.memory.dimension, 384);
        assert_eq!(config.memory.short_term_capacity, 50);
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn load_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, r#"{ "network": { "port": 9100 } }"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.network.port, 9100);
        assert_eq!(config.network.bind, "127.0.0.1");
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn overrides_apply_in_priority_order() {
        let vars: HashMap<&str, &str> = [
            ("RECALL_PORT", "9200"),
            ("RECALL_AUTH_TOKEN", "secret"),
            ("RECALL_DATA_DIR", "/var/lib/recall"),
            ("OPENAI_API_KEY", "sk-fallback"),
            ("RECALL_LOG_LEVEL", "warn"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.network.port, 9200);
        assert_eq!(config.auth.token.as_deref(), Some("secret"));
        assert_eq!(config.memory.data_dir, "/var/lib/recall");
        assert_eq!(config.embedding.api_key.as_deref(), Some("sk-fallback"));
        assert_eq!(config.observability.log_level, "warn");
    }

    #[test]
    fn invalid_port_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|k| (k == "RECALL_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.network.port, 9004);
    }

    #[test]
    fn memory_paths_join_data_dir() {
        let memory = MemoryConfig::in_dir("/tmp/recall");
        assert_eq!(
            memory.index_path(),
            PathBuf::from("/tmp/recall/memory_index.bin")
        );
        assert_eq!(
            memory.entries_path(),
            PathBuf::from("/tmp/recall/memory_data.json")
        );
    }
}
