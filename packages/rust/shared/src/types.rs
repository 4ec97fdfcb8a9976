//! Wire and domain types shared by the pipeline, collaborators and server.

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Retrieval mode used when the caller does not pick one.
pub const DEFAULT_RAG_MODE: &str = "default";

// ---------------------------------------------------------------------------
// RequestId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one `/invoke` call (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Generate a new time-sortable request identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Incoming query
// ---------------------------------------------------------------------------

/// One prior conversation entry, as sent by the frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Speaker tag: `user`/`human`, `ai`/`assistant`, or `system`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Message text.
    pub content: String,
    /// Frontend-assigned identifier.
    pub id: String,
}

/// Caller-supplied options (`extra_info` on the wire).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Model to generate with; the configured default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_model: Option<String>,
    /// Retrieval mode tag forwarded to the retrieval service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_mode: Option<String>,
}

impl QueryOptions {
    /// Retrieval mode, falling back to [`DEFAULT_RAG_MODE`].
    pub fn rag_mode(&self) -> &str {
        self.rag_mode.as_deref().unwrap_or(DEFAULT_RAG_MODE)
    }
}

/// Body of `POST /invoke`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserQuery {
    /// Conversation so far, oldest first.
    pub messages: Vec<Message>,
    /// Required options bag; its fields are individually optional.
    pub extra_info: QueryOptions,
}

// ---------------------------------------------------------------------------
// LLM-facing messages
// ---------------------------------------------------------------------------

/// Role of a message in an LLM chat payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A role-tagged message in the form chat-completion APIs expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Output events
// ---------------------------------------------------------------------------

/// One line of the `/invoke` response stream.
///
/// Transform stages always carry `extra_info` (JSON `null` when they had
/// nothing to add); stream-producer chunks omit the key entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    /// Name of the producing stage.
    pub stage: String,
    /// Full or partial textual payload.
    pub response: String,
    /// `Some(Value::Null)` for a transform with nothing to add, `None` when
    /// the key is absent.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub extra_info: Option<serde_json::Value>,
}

/// Keeps an explicit `null` instead of folding it into `None`.
fn present_value<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

impl StageEvent {
    /// Event for a transform stage.
    pub fn transform(
        stage: impl Into<String>,
        response: impl Into<String>,
        extra_info: Option<serde_json::Value>,
    ) -> Self {
        Self {
            stage: stage.into(),
            response: response.into(),
            extra_info: Some(extra_info.unwrap_or(serde_json::Value::Null)),
        }
    }

    /// Event for one chunk of a stream-producer stage.
    pub fn chunk(stage: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            response: response.into(),
            extra_info: None,
        }
    }

    /// Serialize as one newline-terminated JSON record.
    pub fn to_ndjson(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
