use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// All defaults. Used when no config file is present.
    pub fn minimal() -> Self {
        Self::default()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_base_url")]
    pub base_url: String,
    #[serde(default = "default_search_engine")]
    pub engine: String,
    /// Name of the environment variable holding the search API key.
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_search_base_url(),
            engine: default_search_engine(),
            api_key_env: default_search_key_env(),
            timeout_secs: default_search_timeout_secs(),
        }
    }
}

fn default_search_base_url() -> String {
    "https://serpapi.com".to_string()
}
fn default_search_engine() -> String {
    "google".to_string()
}
fn default_search_key_env() -> String {
    "SERPAPI_KEY".to_string()
}
fn default_search_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
    /// Pages must yield strictly more than this many characters to count.
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default = "default_referer")]
    pub referer: String,
    /// Statuses that earn one retry with a fresh User-Agent.
    #[serde(default = "default_retry_statuses")]
    pub retry_statuses: Vec<u16>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout_secs(),
            min_chars: default_min_chars(),
            referer: default_referer(),
            retry_statuses: default_retry_statuses(),
        }
    }
}

fn default_fetch_timeout_secs() -> u64 {
    10
}
fn default_min_chars() -> usize {
    50
}
fn default_referer() -> String {
    "https://www.google.com/".to_string()
}
fn default_retry_statuses() -> Vec<u16> {
    vec![403, 406, 422]
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    /// Maximum fetches in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_corpus_max_chars")]
    pub corpus_max_chars: usize,
    #[serde(default = "default_recency_hint")]
    pub recency_hint: String,
    #[serde(default = "default_fallback_threshold")]
    pub fallback_threshold_chars: usize,
    #[serde(default = "default_fallback_site")]
    pub fallback_site: String,
    #[serde(default = "default_year_hint")]
    pub fallback_year_hint: String,
    #[serde(default = "default_fallback_results")]
    pub fallback_results: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            concurrency: default_concurrency(),
            corpus_max_chars: default_corpus_max_chars(),
            recency_hint: default_recency_hint(),
            fallback_threshold_chars: default_fallback_threshold(),
            fallback_site: default_fallback_site(),
            fallback_year_hint: default_year_hint(),
            fallback_results: default_fallback_results(),
        }
    }
}

fn default_max_pages() -> usize {
    5
}
fn default_concurrency() -> usize {
    4
}
fn default_corpus_max_chars() -> usize {
    10_000
}
fn default_recency_hint() -> String {
    "news 2025".to_string()
}
fn default_fallback_threshold() -> usize {
    1_000
}
fn default_fallback_site() -> String {
    "wikipedia.org".to_string()
}
fn default_year_hint() -> String {
    "2025".to_string()
}
fn default_fallback_results() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the model-hosting API key.
    #[serde(default = "default_model_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_do_sample")]
    pub do_sample: bool,
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
    /// Total attempts, including the first.
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: f64,
    /// `"fixed"` or `"exponential"`.
    #[serde(default = "default_backoff")]
    pub backoff: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_model_base_url(),
            model: default_model(),
            api_key_env: default_model_key_env(),
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            do_sample: default_do_sample(),
            timeout_secs: default_model_timeout_secs(),
            retries: default_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            backoff: default_backoff(),
        }
    }
}

fn default_model_base_url() -> String {
    "https://api-inference.huggingface.co".to_string()
}
fn default_model() -> String {
    "mistralai/Mixtral-8x7B-Instruct-v0.1".to_string()
}
fn default_model_key_env() -> String {
    "HUGGINGFACE_API_KEY".to_string()
}
fn default_max_new_tokens() -> u32 {
    200
}
fn default_temperature() -> f64 {
    0.7
}
fn default_top_p() -> f64 {
    0.9
}
fn default_do_sample() -> bool {
    true
}
fn default_model_timeout_secs() -> u64 {
    30
}
fn default_retries() -> u32 {
    3
}
fn default_retry_delay_secs() -> f64 {
    2.0
}
fn default_backoff() -> String {
    "fixed".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnswerConfig {
    #[serde(default = "default_context_max_chars")]
    pub context_max_chars: usize,
    #[serde(default = "default_min_words")]
    pub min_words: usize,
    /// Keep "insufficient information" replies in the conversation history.
    #[serde(default)]
    pub record_insufficient_turns: bool,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            context_max_chars: default_context_max_chars(),
            min_words: default_min_words(),
            record_insufficient_turns: false,
        }
    }
}

fn default_context_max_chars() -> usize {
    4_000
}
fn default_min_words() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Conversations kept in memory; the least recently used is dropped first.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_sessions: default_max_sessions(),
        }
    }
}

fn default_max_sessions() -> usize {
    1_024
}

fn default_bind() -> String {
    "127.0.0.1:5001".to_string()
}

/// Load `KEY=value` pairs from a `.env` file in the working directory or
/// one of its parents. Variables already set in the process environment
/// are left untouched.
pub fn load_dotenv() -> Option<PathBuf> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::debug!(path = %path.display(), "loaded .env");
            Some(path)
        }
        Err(e) if e.not_found() => None,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unreadable .env file");
            None
        }
    }
}

/// Read a secret from the environment variable named by `env_name`.
/// Empty values count as missing.
pub fn secret_from_env(env_name: &str) -> Option<String> {
    std::env::var(env_name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to [`Config::minimal`].
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate retrieval
    if config.retrieval.max_pages == 0 {
        anyhow::bail!("retrieval.max_pages must be >= 1");
    }
    if config.retrieval.concurrency == 0 {
        anyhow::bail!("retrieval.concurrency must be >= 1");
    }
    if config.answer.context_max_chars == 0 {
        anyhow::bail!("answer.context_max_chars must be > 0");
    }
    if config.retrieval.corpus_max_chars < config.answer.context_max_chars {
        anyhow::bail!(
            "retrieval.corpus_max_chars ({}) must be >= answer.context_max_chars ({})",
            config.retrieval.corpus_max_chars,
            config.answer.context_max_chars
        );
    }

    if config.server.max_sessions == 0 {
        anyhow::bail!("server.max_sessions must be >= 1");
    }

    // Validate timeouts
    if config.fetch.timeout_secs == 0 {
        anyhow::bail!("fetch.timeout_secs must be > 0");
    }
    if config.search.timeout_secs == 0 {
        anyhow::bail!("search.timeout_secs must be > 0");
    }
    if config.model.timeout_secs == 0 {
        anyhow::bail!("model.timeout_secs must be > 0");
    }

    // Validate sampling
    if config.model.retries == 0 {
        anyhow::bail!("model.retries must be >= 1");
    }
    if config.model.retry_delay_secs < 0.0 || !config.model.retry_delay_secs.is_finite() {
        anyhow::bail!("model.retry_delay_secs must be a non-negative number");
    }
    if config.model.temperature <= 0.0 {
        anyhow::bail!("model.temperature must be > 0.0");
    }
    if !(config.model.top_p > 0.0 && config.model.top_p <= 1.0) {
        anyhow::bail!("model.top_p must be in (0.0, 1.0]");
    }

    match config.model.backoff.as_str() {
        "fixed" | "exponential" => {}
        other => anyhow::bail!(
            "Unknown backoff policy: '{}'. Must be fixed or exponential.",
            other
        ),
    }

    Ok(())
}
