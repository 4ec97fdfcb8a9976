//! Interfaces of the services the RAG workflow calls into.
//!
//! Implementations are built once at startup and shared across requests.

use async_trait::async_trait;

use ragstream_shared::{ChatMessage, Result};

use crate::stage::{ChunkStream, Transition};
use crate::state::RequestState;

/// Looks up context for the conversation.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return `state` with `rag_content` set, a human-readable summary, and
    /// optional metadata about what was found.
    async fn retrieve(&self, state: RequestState) -> Result<Transition>;
}

/// Streams a model answer.
pub trait Generator: Send + Sync {
    /// Start generating. No work happens until the stream is first polled.
    fn generate(&self, payload: Vec<ChatMessage>, model: &str) -> ChunkStream;
}
