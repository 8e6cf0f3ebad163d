//! Configuration management for kbqa.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Environment variables
//! - Command-line flags
//! - Config files (`.kbqa/config.yaml`)
//!
//! Besides the LLM settings it carries everything the answer engine needs:
//! the ordered knowledge tiers, the escalation thresholds, the failure
//! phrases, and the web fallback provider.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Providers the LLM factory knows how to build.
pub const KNOWN_LLM_PROVIDERS: [&str; 3] = ["ollama", "together", "openai"];

/// Embedding providers the knowledge crate knows how to build.
pub const KNOWN_EMBEDDING_PROVIDERS: [&str; 2] = ["trigram", "ollama"];

/// Web search providers the knowledge crate knows how to build.
pub const KNOWN_WEB_PROVIDERS: [&str; 2] = ["tavily", "duckduckgo"];

/// Phrases an LLM uses when it admits it cannot answer from the context.
pub const DEFAULT_FAILURE_PHRASES: [&str; 8] = [
    "i do not have enough information",
    "i don't have enough information",
    "the provided context does not",
    "the context does not contain",
    "i'm not sure",
    "i am not sure",
    "cannot find",
    "could not find this information",
];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .kbqa/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Root directory holding the per-tier indexes
    pub storage_dir: PathBuf,

    /// Active LLM provider ("ollama", "together", "openai")
    pub provider: String,

    /// Active model identifier
    pub model: String,

    /// API key for the LLM provider
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// LLM provider configurations
    pub llm: Option<LlmConfig>,

    /// Embedding provider settings
    pub embedding: EmbeddingSettings,

    /// Escalation thresholds and limits
    pub retrieval: RetrievalConfig,

    /// Live web search fallback
    pub web_search: WebSearchConfig,

    /// Knowledge tiers in strict priority order
    pub tiers: Vec<TierConfig>,
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    /// Any OpenAI-compatible chat completions API (Together AI, OpenAI).
    OpenAiCompatible {
        #[serde(rename = "apiKeyEnv")]
        api_key_env: String,
        model: String,
        endpoint: Option<String>,
    },
    Ollama {
        endpoint: String,
        model: String,
        timeout: Option<u64>,
    },
}

impl ProviderConfig {
    /// Model configured for this provider.
    pub fn model(&self) -> &str {
        match self {
            Self::OpenAiCompatible { model, .. } => model,
            Self::Ollama { model, .. } => model,
        }
    }

    /// Custom endpoint, if any.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::OpenAiCompatible { endpoint, .. } => endpoint.as_deref(),
            Self::Ollama { endpoint, .. } => Some(endpoint.as_str()),
        }
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Provider name: "trigram" or "ollama"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Endpoint for HTTP providers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            endpoint: None,
        }
    }
}

/// Thresholds and limits for the escalation chain.
///
/// Scores are cosine similarities: higher means more relevant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalConfig {
    /// Threshold for the per-tier strict phase
    pub strict_threshold: f32,

    /// Threshold for the combined relaxed phase
    pub relaxed_threshold: f32,

    /// Threshold for the combined emergency phase
    pub emergency_threshold: f32,

    /// Candidates requested from each index
    pub top_k: usize,

    /// Upper bound on passages handed to the LLM in one prompt
    pub max_context_passages: usize,

    /// Answers shorter than this are treated as failures
    pub min_answer_chars: usize,

    /// Case-insensitive phrases marking a non-answer
    pub failure_phrases: Vec<String>,

    /// Attempts made while waiting for an index to appear
    pub index_retry_attempts: u32,

    /// Delay before the second attempt
    pub index_retry_delay_ms: u64,

    /// Multiplier applied to the delay after each attempt (1.0 = fixed)
    pub index_retry_backoff: f32,

    /// Wall-clock budget for one query
    pub query_timeout_secs: u64,

    /// Sampling temperature for answer synthesis
    pub temperature: f32,

    /// Maximum tokens generated per answer
    pub max_tokens: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            strict_threshold: 0.7,
            relaxed_threshold: 0.5,
            emergency_threshold: 0.3,
            top_k: 5,
            max_context_passages: 20,
            min_answer_chars: 15,
            failure_phrases: DEFAULT_FAILURE_PHRASES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            index_retry_attempts: 3,
            index_retry_delay_ms: 2000,
            index_retry_backoff: 1.0,
            query_timeout_secs: 45,
            temperature: 0.3,
            max_tokens: 1000,
        }
    }
}

/// Live web search fallback settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WebSearchConfig {
    /// Whether the web fallback phase runs at all
    pub enabled: bool,

    /// Provider name: "tavily" or "duckduckgo"
    pub provider: String,

    /// Environment variable holding the provider API key
    pub api_key_env: String,

    /// Results requested per query
    pub max_results: usize,

    /// Custom endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "tavily".to_string(),
            api_key_env: "TAVILY_API_KEY".to_string(),
            max_results: 3,
            endpoint: None,
        }
    }
}

impl WebSearchConfig {
    /// Resolve the provider API key from the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

/// One knowledge tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TierConfig {
    /// Stable identifier used on the command line ("documents")
    pub name: String,

    /// Label attached to answers from this tier ("Documents")
    pub label: String,

    /// Directory under the storage root holding the index
    pub index_dir: String,
}

impl TierConfig {
    pub fn new(name: &str, label: &str, index_dir: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            index_dir: index_dir.to_string(),
        }
    }

    /// Documents, scraped websites, video transcripts.
    pub fn default_tiers() -> Vec<Self> {
        vec![
            Self::new("documents", "Documents", "doc_index"),
            Self::new("scraped", "Web", "scraped_index"),
            Self::new("youtube", "YouTube", "youtube_index"),
        ]
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmConfig>,
    workspace: Option<WorkspaceConfig>,
    storage: Option<StorageConfig>,
    logging: Option<LoggingConfig>,
    embedding: Option<EmbeddingSettings>,
    retrieval: Option<RetrievalConfig>,
    #[serde(rename = "webSearch")]
    web_search: Option<WebSearchConfig>,
    tiers: Option<Vec<TierConfig>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StorageConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let workspace = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            storage_dir: workspace.join("persistent_storage"),
            workspace,
            config_file: None,
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
            llm: None,
            embedding: EmbeddingSettings::default(),
            retrieval: RetrievalConfig::default(),
            web_search: WebSearchConfig::default(),
            tiers: TierConfig::default_tiers(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// Environment variables:
    /// - `KBQA_WORKSPACE`: Override workspace path
    /// - `KBQA_CONFIG`: Path to config file
    /// - `KBQA_PROVIDER`: LLM provider
    /// - `KBQA_MODEL`: Model identifier
    /// - `KBQA_API_KEY`: API key
    /// - `PERSISTENT_STORAGE_PATH`: Root directory of the tier indexes
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use kbqa_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Storage: {:?}", config.storage_dir);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_from(None, None)
    }

    /// Load configuration with an explicit workspace and config file.
    ///
    /// Explicit paths (usually the `--workspace` and `--config` flags) win
    /// over `KBQA_WORKSPACE` and `KBQA_CONFIG`. They are resolved before the
    /// YAML file is read, so the file's settings and the storage root follow
    /// the chosen workspace.
    pub fn load_from(
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
    ) -> AppResult<Self> {
        let mut config = Self::default();

        let workspace =
            workspace.or_else(|| std::env::var("KBQA_WORKSPACE").ok().map(PathBuf::from));
        if let Some(workspace) = workspace {
            config.storage_dir = workspace.join("persistent_storage");
            config.workspace = workspace;
        }

        config.config_file =
            config_file.or_else(|| std::env::var("KBQA_CONFIG").ok().map(PathBuf::from));

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.workspace.join(".kbqa/config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        } else if config.config_file.is_some() {
            return Err(AppError::Config(format!(
                "Config file does not exist: {:?}",
                config_path
            )));
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("KBQA_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("KBQA_MODEL") {
            config.model = model;
        }

        if let Ok(storage) = std::env::var("PERSISTENT_STORAGE_PATH") {
            config.storage_dir = PathBuf::from(storage);
        }

        config.api_key = std::env::var("KBQA_API_KEY").ok();
        config.log_level = std::env::var("RUST_LOG").ok();

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        tracing::debug!("Merging config file {:?}", path);

        let mut result = self.clone();

        if let Some(path) = config_file.workspace.and_then(|ws| ws.path) {
            result.workspace = PathBuf::from(path);
            result.storage_dir = result.workspace.join("persistent_storage");
        }

        if let Some(path) = config_file.storage.and_then(|s| s.path) {
            let path = PathBuf::from(path);
            result.storage_dir = if path.is_absolute() {
                path
            } else {
                result.workspace.join(path)
            };
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(llm) = config_file.llm {
            result.provider = llm.active_provider.clone();

            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                result.model = provider_config.model().to_string();
            }

            result.llm = Some(llm);
        }

        if let Some(embedding) = config_file.embedding {
            result.embedding = embedding;
        }

        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = retrieval;
        }

        if let Some(web_search) = config_file.web_search {
            result.web_search = web_search;
        }

        if let Some(tiers) = config_file.tiers {
            result.tiers = tiers;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables and YAML.
    /// The workspace and config file are not overrides: pass them to
    /// [`AppConfig::load_from`] so the YAML file is read from the right place.
    pub fn with_overrides(
        mut self,
        storage_dir: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(storage_dir) = storage_dir {
            self.storage_dir = storage_dir;
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .kbqa directory.
    pub fn kbqa_dir(&self) -> PathBuf {
        self.workspace.join(".kbqa")
    }

    /// Ensure the .kbqa directory exists.
    pub fn ensure_kbqa_dir(&self) -> AppResult<()> {
        let dir = self.kbqa_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create .kbqa directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Look up a tier by name.
    pub fn tier(&self, name: &str) -> Option<&TierConfig> {
        self.tiers.iter().find(|t| t.name == name)
    }

    /// Get the configuration for a provider.
    pub fn get_provider_config(&self, provider: &str) -> Option<ProviderConfig> {
        self.llm
            .as_ref()
            .and_then(|llm| llm.providers.get(provider).cloned())
    }

    /// Resolve API key for the provider.
    ///
    /// `KBQA_API_KEY` wins; otherwise the provider's `apiKeyEnv`, falling back
    /// to the conventional variable name for known hosted providers.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        let env_var = match self.get_provider_config(provider) {
            Some(ProviderConfig::OpenAiCompatible { api_key_env, .. }) => Some(api_key_env),
            Some(ProviderConfig::Ollama { .. }) => None,
            None => match provider {
                "together" => Some("TOGETHER_API_KEY".to_string()),
                "openai" => Some("OPENAI_API_KEY".to_string()),
                _ => None,
            },
        };

        env_var
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty())
    }

    /// Validate configuration before building the answer engine.
    pub fn validate(&self) -> AppResult<()> {
        let provider = self.provider.as_str();

        if !KNOWN_LLM_PROVIDERS.contains(&provider) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                provider,
                KNOWN_LLM_PROVIDERS.join(", ")
            )));
        }

        if provider != "ollama" && self.resolve_api_key(provider).is_none() {
            return Err(AppError::Config(format!(
                "No API key found for provider '{}'",
                provider
            )));
        }

        if !KNOWN_EMBEDDING_PROVIDERS.contains(&self.embedding.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embedding.provider,
                KNOWN_EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "Embedding dimensions must be greater than zero".to_string(),
            ));
        }

        if self.web_search.enabled
            && !KNOWN_WEB_PROVIDERS.contains(&self.web_search.provider.as_str())
        {
            return Err(AppError::Config(format!(
                "Unknown web search provider: {}. Supported: {}",
                self.web_search.provider,
                KNOWN_WEB_PROVIDERS.join(", ")
            )));
        }

        self.validate_retrieval()?;
        self.validate_tiers()?;

        tracing::debug!(
            "Configuration valid: provider {}, {} tiers, web search {}",
            self.provider,
            self.tiers.len(),
            if self.web_search.enabled {
                self.web_search.provider.as_str()
            } else {
                "disabled"
            }
        );
        Ok(())
    }

    fn validate_retrieval(&self) -> AppResult<()> {
        let r = &self.retrieval;

        if !(r.strict_threshold >= r.relaxed_threshold
            && r.relaxed_threshold >= r.emergency_threshold)
        {
            return Err(AppError::Config(format!(
                "Thresholds must not increase while relaxing: strict {} >= relaxed {} >= emergency {}",
                r.strict_threshold, r.relaxed_threshold, r.emergency_threshold
            )));
        }

        if r.top_k == 0 {
            return Err(AppError::Config("retrieval.topK must be at least 1".to_string()));
        }

        if r.max_context_passages == 0 {
            return Err(AppError::Config(
                "retrieval.maxContextPassages must be at least 1".to_string(),
            ));
        }

        if r.query_timeout_secs == 0 {
            return Err(AppError::Config(
                "retrieval.queryTimeoutSecs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_tiers(&self) -> AppResult<()> {
        let mut seen = HashSet::new();
        for tier in &self.tiers {
            if tier.name.trim().is_empty() || tier.index_dir.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "Tier {:?} needs a name and an index directory",
                    tier
                )));
            }
            if !seen.insert(tier.name.as_str()) {
                return Err(AppError::Config(format!("Duplicate tier name: {}", tier.name)));
            }
        }
        Ok(())
    }
}
