//! Append-only conversation transcript.

use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use tracing::debug;

use crate::types::{CompletionResult, Message, Role};

/// Ordered transcript of one conversation.
///
/// Entries are append-only; the only other mutation is a full reset.
/// Appends are serialized, so concurrent writers never interleave
/// partially or lose entries.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Mutex<Vec<Message>>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a user message and return the appended entry.
    pub fn append_user(&self, content: &str) -> Message {
        let message = Message::text(Role::User, content);
        self.push(message.clone());
        message
    }

    /// Append the transcript entry for a terminal completion outcome.
    ///
    /// Success and failure outcomes each produce one assistant entry;
    /// a cancelled outcome produces none and returns `None`.
    pub fn append_assistant(
        &self,
        provider: &str,
        model: &str,
        result: &CompletionResult,
    ) -> Option<Message> {
        let message = match result {
            CompletionResult::Success(completion) => Message {
                role: Role::Assistant,
                content: completion.content.clone(),
                timestamp: Utc::now(),
                provider: Some(provider.to_string()),
                model: Some(model.to_string()),
                response_time_ms: Some(completion.latency_ms),
                token_count: completion.token_count,
                raw_response: completion.raw_response.clone(),
                error: None,
            },
            CompletionResult::Failure(failure) => Message {
                role: Role::Assistant,
                content: failure.summary(),
                timestamp: Utc::now(),
                provider: Some(provider.to_string()),
                model: Some(model.to_string()),
                response_time_ms: None,
                token_count: None,
                raw_response: None,
                error: Some(failure.detail.clone()),
            },
            CompletionResult::Cancelled => {
                debug!(provider, model, "Cancelled exchange leaves no transcript entry");
                return None;
            }
        };

        self.push(message.clone());
        Some(message)
    }

    /// Drop every entry.
    pub fn reset(&self) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// A value snapshot of the transcript in append order.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, message: Message) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }
}
