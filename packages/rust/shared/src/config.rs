//! Application configuration for ragstream.
//!
//! User config lives at `~/.ragstream/ragstream.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RagstreamError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "ragstream.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".ragstream";

/// Placeholder substituted with retrieved context in the system prompt.
pub const RAG_CONTENT_PLACEHOLDER: &str = "{rag_content}";

// ---------------------------------------------------------------------------
// Config structs (matching ragstream.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Language model endpoint settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Retrieval service settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Prompt templates.
    #[serde(default)]
    pub prompt: PromptConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Events buffered between the pipeline task and the response body.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8000
}
fn default_event_buffer() -> usize {
    1
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used when the caller does not pick one.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Connection setup timeout.
    #[serde(default = "default_llm_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Longest silence allowed between reads, headers included. Long
    /// answers that keep streaming are never cut off.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Sampling temperature forwarded to the model, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            connect_timeout_secs: default_llm_connect_timeout(),
            timeout_secs: default_llm_timeout(),
            temperature: None,
        }
    }
}

fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "chatgpt-4o-latest".into()
}
fn default_llm_connect_timeout() -> u64 {
    10
}
fn default_llm_timeout() -> u64 {
    120
}

/// `[retrieval]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Base URL of the retrieval service.
    #[serde(default = "default_retrieval_base_url")]
    pub base_url: String,

    /// Number of documents requested per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Request timeout.
    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            base_url: default_retrieval_base_url(),
            top_k: default_top_k(),
            timeout_secs: default_retrieval_timeout(),
        }
    }
}

fn default_retrieval_base_url() -> String {
    "http://127.0.0.1:8001".into()
}
fn default_top_k() -> usize {
    5
}
fn default_retrieval_timeout() -> u64 {
    30
}

/// `[prompt]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// System prompt template; `{rag_content}` is replaced with retrieved context.
    #[serde(default = "default_system_template")]
    pub system_template: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_template: default_system_template(),
        }
    }
}

fn default_system_template() -> String {
    "You are a helpful assistant. Answer the user's question using the \
     reference material below. If the material does not contain the answer, \
     say so instead of guessing.\n\n\
     ## Reference material\n\n{rag_content}"
        .into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.ragstream/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| RagstreamError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.ragstream/ragstream.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RagstreamError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        RagstreamError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| RagstreamError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RagstreamError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RagstreamError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject values that would only fail later at request time.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.server.event_buffer == 0 {
        return Err(RagstreamError::config("server.event_buffer must be at least 1"));
    }
    if config.llm.default_model.trim().is_empty() {
        return Err(RagstreamError::config("llm.default_model must not be empty"));
    }
    if !config.prompt.system_template.contains(RAG_CONTENT_PLACEHOLDER) {
        return Err(RagstreamError::config(format!(
            "prompt.system_template must contain {RAG_CONTENT_PLACEHOLDER}"
        )));
    }
    for (name, raw) in [
        ("llm.base_url", &config.llm.base_url),
        ("retrieval.base_url", &config.retrieval.base_url),
    ] {
        url::Url::parse(raw)
            .map_err(|e| RagstreamError::config(format!("{name} '{raw}' is not a URL: {e}")))?;
    }
    Ok(())
}

/// Check that the LLM API key env var is set and non-empty, returning it.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.llm.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(RagstreamError::config(format!(
            "LLM API key not found. Set the {var_name} environment variable."
        ))),
    }
}
