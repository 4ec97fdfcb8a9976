//! System prompt rendering and generation payload assembly.

use ragstream_shared::{ChatMessage, RAG_CONTENT_PLACEHOLDER};

/// Substitute `{rag_content}` in `template`.
pub fn render_system_prompt(template: &str, rag_content: &str) -> String {
    template.replace(RAG_CONTENT_PLACEHOLDER, rag_content)
}

/// `[system(rendered template), ...transcript]`.
pub fn generation_payload(
    template: &str,
    rag_content: &str,
    transcript: &[ChatMessage],
) -> Vec<ChatMessage> {
    let mut payload = Vec::with_capacity(transcript.len() + 1);
    payload.push(ChatMessage::system(render_system_prompt(template, rag_content)));
    payload.extend_from_slice(transcript);
    payload
}
