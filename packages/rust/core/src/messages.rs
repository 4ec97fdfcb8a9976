//! Frontend conversation entries → role-tagged LLM messages.

use ragstream_shared::{ChatMessage, Message, RagstreamError, Result, Role};

/// Map a frontend `type` tag onto an LLM role.
pub fn role_for(kind: &str) -> Option<Role> {
    match kind.trim().to_ascii_lowercase().as_str() {
        "user" | "human" => Some(Role::User),
        "ai" | "assistant" => Some(Role::Assistant),
        "system" => Some(Role::System),
        _ => None,
    }
}

/// Convert the transcript into chat messages, preserving order.
///
/// Rejects an empty transcript and any entry whose `type` is unknown.
pub fn build_llm_messages(messages: &[Message]) -> Result<Vec<ChatMessage>> {
    if messages.is_empty() {
        return Err(RagstreamError::validation("messages must not be empty"));
    }

    messages
        .iter()
        .map(|m| {
            let role = role_for(&m.kind).ok_or_else(|| {
                RagstreamError::validation(format!(
                    "message {}: unknown type '{}'",
                    m.id, m.kind
                ))
            })?;
            Ok(ChatMessage {
                role,
                content: m.content.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(kind: &str, content: &str, id: &str) -> Message {
        Message {
            kind: kind.into(),
            content: content.into(),
            id: id.into(),
        }
    }

    #[test]
    fn maps_roles_in_order() {
        let out = build_llm_messages(&[
            msg("user", "What is X?", "1"),
            msg("ai", "X is Y.", "2"),
            msg("human", "Why?", "3"),
        ])
        .unwrap();

        assert_eq!(
            out,
            vec![
                ChatMessage::user("What is X?"),
                ChatMessage::assistant("X is Y."),
                ChatMessage::user("Why?"),
            ]
        );
    }

    #[test]
    fn empty_transcript_is_rejected() {
        let err = build_llm_messages(&[]).unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn unknown_type_names_the_message() {
        let err = build_llm_messages(&[msg("tool", "{}", "7")]).unwrap_err();
        assert!(err.to_string().contains("message 7"));
        assert!(err.to_string().contains("'tool'"));
    }

    #[test]
    fn type_tag_is_case_insensitive() {
        assert_eq!(role_for(" Assistant "), Some(Role::Assistant));
        assert_eq!(role_for("SYSTEM"), Some(Role::System));
    }
}
