//! Prompt templates for retrieval-augmented chat

use crate::types::{ChatMessage, StoredMessage};

/// Prompt builder for chat requests
pub struct PromptBuilder;

impl PromptBuilder {
    /// Prepend retrieved context to the user's question
    ///
    /// An empty context leaves the question untouched.
    pub fn augment(question: &str, context: &str) -> String {
        if context.trim().is_empty() {
            return question.to_string();
        }

        format!(
            r#"Use the following context from the document library to answer the question. If the context does not help, answer from your own knowledge.

Context:
{context}

Question: {question}"#,
            context = context.trim(),
            question = question
        )
    }

    /// Build the message list for a chat request
    ///
    /// The last `window` stored messages come first (oldest first), then the new prompt.
    pub fn conversation(history: &[StoredMessage], prompt: &str, window: usize) -> Vec<ChatMessage> {
        let skip = history.len().saturating_sub(window);
        let mut messages: Vec<ChatMessage> = history
            .iter()
            .skip(skip)
            .filter(|m| !m.content.is_empty())
            .map(StoredMessage::to_chat_message)
            .collect();

        messages.push(ChatMessage::user(prompt));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use chrono::Utc;

    fn stored(id: i64, is_user: bool, content: &str) -> StoredMessage {
        StoredMessage {
            id,
            session_id: 1,
            is_user,
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_augment_without_context() {
        assert_eq!(PromptBuilder::augment("hello", ""), "hello");
        assert_eq!(PromptBuilder::augment("hello", " \n"), "hello");
    }

    #[test]
    fn test_augment_with_context() {
        let prompt = PromptBuilder::augment("Who wrote it?", "Ada wrote the notes.\nBabbage built it.");
        assert!(prompt.contains("Ada wrote the notes.\nBabbage built it."));
        assert!(prompt.ends_with("Question: Who wrote it?"));
        assert!(prompt.find("Context:").unwrap() < prompt.find("Question:").unwrap());
    }

    #[test]
    fn test_conversation_window() {
        let history = vec![
            stored(1, true, "first"),
            stored(2, false, "reply one"),
            stored(3, true, "second"),
            stored(4, false, "reply two"),
        ];

        let messages = PromptBuilder::conversation(&history, "third", 2);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], ChatMessage::user("second"));
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[2], ChatMessage::user("third"));
    }

    #[test]
    fn test_conversation_zero_window() {
        let history = vec![stored(1, true, "first")];
        let messages = PromptBuilder::conversation(&history, "next", 0);
        assert_eq!(messages, vec![ChatMessage::user("next")]);
    }
}
