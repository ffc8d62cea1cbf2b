//! Text generation seam.
//!
//! The query executor talks to a [`Generator`] with a flat list of chat
//! messages. Concrete backends live in `services/`; [`EchoGenerator`] is the
//! offline stand-in.

use crate::error::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, ServiceError>;
}

/// Echoes the last user message back, prefixed with `[echo]`, plus any system
/// context it was given. Used when no API key is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoGenerator;

#[async_trait]
impl Generator for EchoGenerator {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, ServiceError> {
        let question = messages
            .iter()
            .rev()
            .find(|message| message.role == ChatRole::User)
            .map(|message| message.content.as_str())
            .unwrap_or_default();

        let context = messages
            .iter()
            .find(|message| message.role == ChatRole::System)
            .and_then(|message| message.content.split_once("Context:\n"))
            .map(|(_, context)| context.trim());

        Ok(match context {
            Some(context) if !context.is_empty() => format!("[echo] {question}\n{context}"),
            _ => format!("[echo] {question}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_returns_last_user_message() {
        let messages = vec![
            ChatMessage::system("You are a helpful assistant."),
            ChatMessage::user("first"),
            ChatMessage::assistant("[echo] first"),
            ChatMessage::user("second"),
        ];
        assert_eq!(EchoGenerator.generate(&messages).await.unwrap(), "[echo] second");
    }

    #[tokio::test]
    async fn echo_includes_retrieved_context() {
        let messages = vec![
            ChatMessage::system("Answer the question.\n\nContext:\n[1] doc1.txt: fox"),
            ChatMessage::user("animal?"),
        ];
        let reply = EchoGenerator.generate(&messages).await.unwrap();
        assert_eq!(reply, "[echo] animal?\n[1] doc1.txt: fox");
    }

    #[tokio::test]
    async fn echo_handles_empty_input() {
        assert_eq!(EchoGenerator.generate(&[]).await.unwrap(), "[echo] ");
    }
}
