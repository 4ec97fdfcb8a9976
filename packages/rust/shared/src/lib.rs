//! Shared types, error model, and configuration for ragstream.
//!
//! This crate is the foundation depended on by all other ragstream crates.
//! It provides:
//! - [`RagstreamError`] — the unified error type
//! - Wire types ([`UserQuery`], [`Message`], [`ChatMessage`], [`StageEvent`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, LlmConfig, PromptConfig, RAG_CONTENT_PLACEHOLDER, RetrievalConfig, ServerConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, validate_api_key,
    validate_config,
};
pub use error::{RagstreamError, Result};
pub use types::{
    ChatMessage, DEFAULT_RAG_MODE, Message, QueryOptions, RequestId, Role, StageEvent, UserQuery,
};
