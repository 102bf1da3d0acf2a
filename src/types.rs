//! Common types for chat completion requests and outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::GenerationSettings;

/// The role of a message sender.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single entry in a conversation transcript.
///
/// Entries are immutable once appended. Metadata fields are only populated
/// on assistant entries; `error` marks an entry that records a failed
/// exchange rather than model output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Message {
    /// A plain message with only role, content, and timestamp set.
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            provider: None,
            model: None,
            response_time_ms: None,
            token_count: None,
            raw_response: None,
            error: None,
        }
    }
}

/// A fully-assembled completion request.
///
/// Carries value snapshots of the transcript and settings taken at build
/// time; later mutations of either store do not affect a request already
/// in flight.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompletionRequest {
    pub provider: String,
    pub model: String,
    pub messages: Vec<Message>,
    pub settings: GenerationSettings,
    pub streaming: bool,
}

/// Payload of a successful completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Completion {
    pub content: String,
    /// Token usage as reported by the provider, never derived locally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
    /// Wall-clock time from first dispatch to terminal success, retries included.
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<serde_json::Value>,
}

/// Classification of a terminal failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request could not be assembled; never dispatched, never retried.
    InvalidRequest,
    /// Streaming was requested from a provider that cannot stream; never retried.
    UnsupportedFeature,
    /// The transport call failed outright.
    Transport,
    /// A fragment stream broke off before the end-of-stream signal.
    StreamInterrupted,
}

/// A terminal failure, reported after the retry budget is spent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionFailure {
    pub kind: ErrorKind,
    /// Number of transport attempts made. Zero when the request never dispatched.
    pub attempts: u32,
    /// Detail of the last underlying error.
    pub detail: String,
}

impl CompletionFailure {
    /// One-line human-readable summary, suitable as transcript content.
    pub fn summary(&self) -> String {
        if self.attempts == 0 {
            format!("Request could not be dispatched: {}", self.detail)
        } else if self.attempts == 1 {
            format!("Request failed after 1 attempt: {}", self.detail)
        } else {
            format!("Request failed after {} attempts: {}", self.attempts, self.detail)
        }
    }
}

/// Terminal outcome of one completion request.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionResult {
    Success(Completion),
    Failure(CompletionFailure),
    /// The caller cancelled mid-flight. Not a failure; leaves no transcript entry.
    Cancelled,
}

impl CompletionResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The failure payload, if this outcome is a failure.
    pub fn failure(&self) -> Option<&CompletionFailure> {
        match self {
            Self::Failure(failure) => Some(failure),
            _ => None,
        }
    }
}
