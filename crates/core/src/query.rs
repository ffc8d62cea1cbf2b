use crate::embeddings::Embedder;
use crate::error::QueryError;
use crate::generation::{ChatMessage, Generator};
use crate::models::{RagConfig, RetrievedChunk, Speaker, Turn};
use crate::session::Session;
use crate::traits::IndexStorage;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

pub const RETRIEVAL_INSTRUCTIONS: &str =
    "Answer the question based on the following context. Be concise and accurate.";
pub const CONVERSATION_INSTRUCTIONS: &str = "You are a helpful assistant.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerRoute {
    /// The session had a live index; the answer is grounded on retrieved chunks.
    Retrieval,
    /// The session had no index; plain conversation over the transcript.
    Conversation,
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub route: AnswerRoute,
    pub sources: Vec<RetrievedChunk>,
    pub error: Option<QueryError>,
}

/// Answers user messages for a session. Reads the session's index, never
/// modifies it; only the transcript grows.
pub struct QueryExecutor {
    embedder: Arc<dyn Embedder>,
    storage: Arc<dyn IndexStorage>,
    generator: Arc<dyn Generator>,
    top_k: usize,
    history_window: Option<usize>,
}

impl QueryExecutor {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        storage: Arc<dyn IndexStorage>,
        generator: Arc<dyn Generator>,
        config: &RagConfig,
    ) -> Self {
        Self {
            embedder,
            storage,
            generator,
            top_k: config.top_k.max(1),
            history_window: config.history_window,
        }
    }

    /// Records the message, answers it and records the answer. Collaborator
    /// failures become the answer text.
    pub async fn answer(&self, session: &mut Session, message: &str) -> Answer {
        let history = self.history(session.transcript());
        let location = session
            .index()
            .map(|handle| handle.location().to_path_buf());
        session.push_turn(Turn::user(message));

        let (route, outcome) = match location {
            Some(location) => (
                AnswerRoute::Retrieval,
                self.answer_with_retrieval(&location, message, history)
                    .await,
            ),
            None => (
                AnswerRoute::Conversation,
                self.answer_from_conversation(message, history)
                    .await
                    .map(|text| (text, Vec::new())),
            ),
        };

        let answer = match outcome {
            Ok((text, sources)) => Answer {
                text,
                route,
                sources,
                error: None,
            },
            Err(error) => {
                warn!(session = session.name(), ?route, %error, "answer failed");
                Answer {
                    text: error.to_string(),
                    route,
                    sources: Vec::new(),
                    error: Some(error),
                }
            }
        };

        session.push_turn(Turn::assistant(answer.text.clone()));
        answer
    }

    async fn answer_with_retrieval(
        &self,
        location: &Path,
        question: &str,
        history: Vec<ChatMessage>,
    ) -> Result<(String, Vec<RetrievedChunk>), QueryError> {
        let query_vector = self
            .embedder
            .embed(question)
            .await
            .map_err(|error| QueryError::Retrieval(error.to_string()))?;

        let sources = self
            .storage
            .similarity_search(location, &query_vector, self.top_k)
            .await
            .map_err(|error| QueryError::Retrieval(error.to_string()))?;
        debug!(
            location = %location.display(),
            hits = sources.len(),
            "retrieved supporting chunks"
        );

        let messages = retrieval_messages(question, &sources, history);
        let text = self
            .generator
            .generate(&messages)
            .await
            .map_err(|error| QueryError::Retrieval(error.to_string()))?;
        Ok((text, sources))
    }

    async fn answer_from_conversation(
        &self,
        question: &str,
        history: Vec<ChatMessage>,
    ) -> Result<String, QueryError> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(CONVERSATION_INSTRUCTIONS));
        messages.extend(history);
        messages.push(ChatMessage::user(question));

        self.generator
            .generate(&messages)
            .await
            .map_err(|error| QueryError::Generation(error.to_string()))
    }

    fn history(&self, transcript: &[Turn]) -> Vec<ChatMessage> {
        let skip = match self.history_window {
            Some(window) => transcript.len().saturating_sub(window),
            None => 0,
        };

        transcript
            .iter()
            .skip(skip)
            .map(|turn| match turn.speaker {
                Speaker::User => ChatMessage::user(turn.text.clone()),
                Speaker::Assistant => ChatMessage::assistant(turn.text.clone()),
            })
            .collect()
    }
}

fn retrieval_messages(
    question: &str,
    sources: &[RetrievedChunk],
    history: Vec<ChatMessage>,
) -> Vec<ChatMessage> {
    let context = sources
        .iter()
        .enumerate()
        .map(|(position, hit)| {
            format!(
                "[{}] {}: {}",
                position + 1,
                hit.chunk.source_name,
                hit.chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(format!(
        "{RETRIEVAL_INSTRUCTIONS}\n\nContext:\n{context}"
    )));
    messages.extend(history);
    messages.push(ChatMessage::user(question));
    messages
}
