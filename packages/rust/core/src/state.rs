//! Request context threaded through every stage.

use ragstream_shared::{ChatMessage, RagstreamError, RequestId, Result, Role, UserQuery};

use crate::messages::build_llm_messages;

/// Per-request state.
///
/// Built once from a validated [`UserQuery`]; transform stages take it by
/// value and return the next version, stream producers only borrow it.
#[derive(Debug, Clone)]
pub struct RequestState {
    /// Identifier used in logs.
    pub request_id: RequestId,
    /// The query exactly as received.
    pub query: UserQuery,
    /// Normalized transcript.
    pub messages: Vec<ChatMessage>,
    /// Model resolved from the options or the configured default.
    pub model: String,
    /// Context text written by the retrieval stage.
    pub rag_content: Option<String>,
}

impl RequestState {
    /// Validate `query` and build the initial state.
    ///
    /// Fails on an empty transcript, an unknown message type, a transcript
    /// without any user message, or blank option values.
    pub fn from_query(query: UserQuery, default_model: &str) -> Result<Self> {
        let messages = build_llm_messages(&query.messages)?;

        if !messages.iter().any(|m| m.role == Role::User) {
            return Err(RagstreamError::validation(
                "messages must contain at least one user message",
            ));
        }

        let options = &query.extra_info;
        if options
            .reasoning_model
            .as_deref()
            .is_some_and(|m| m.trim().is_empty())
        {
            return Err(RagstreamError::validation(
                "extra_info.reasoning_model must not be blank",
            ));
        }
        if options.rag_mode.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(RagstreamError::validation(
                "extra_info.rag_mode must not be blank",
            ));
        }

        let model = options
            .reasoning_model
            .clone()
            .unwrap_or_else(|| default_model.to_string());

        Ok(Self {
            request_id: RequestId::new(),
            query,
            messages,
            model,
            rag_content: None,
        })
    }

    /// Retrieval mode requested by the caller.
    pub fn rag_mode(&self) -> &str {
        self.query.extra_info.rag_mode()
    }

    /// Content of the most recent user message, used as the search query.
    pub fn latest_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    pub fn with_rag_content(mut self, rag_content: impl Into<String>) -> Self {
        self.rag_content = Some(rag_content.into());
        self
    }
}
