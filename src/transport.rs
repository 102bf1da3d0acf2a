//! Transport seam between the engine and provider backends.
//!
//! The engine is transport-agnostic: it hands a finished request to a
//! [`ChatTransport`] and interprets the outcome. Implementations own the
//! wire protocol; they never retry, and they surface provider failures
//! as [`TransportError`] values instead of panics.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use crate::types::CompletionRequest;

/// Errors that can occur during a transport call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The call exceeded the transport's own deadline
    #[error("request timed out")]
    Timeout,

    /// The backend could not be reached
    #[error("connection failed: {0}")]
    Connection(String),

    /// The provider answered with an error status
    #[error("provider error (status {status}): {message}")]
    Status { status: u16, message: String },
}

/// Full response payload from a provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderResponse {
    pub content: String,
    /// Token usage as reported by the provider; `None` when unreported.
    pub token_count: Option<u32>,
    pub raw_response: Option<serde_json::Value>,
}

/// Trailing metadata delivered with the end-of-stream signal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamEnd {
    pub token_count: Option<u32>,
    pub raw_response: Option<serde_json::Value>,
}

/// One frame of a fragment stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    /// An incremental piece of assistant content.
    Fragment(String),
    /// The provider finished the response; no frames follow.
    End(StreamEnd),
}

/// A finite sequence of stream frames from one attempt.
///
/// A well-formed stream yields zero or more fragments and then exactly
/// one `End` frame. A stream that stops without `End` was interrupted.
/// Dropping the stream releases the underlying connection.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<StreamFrame, TransportError>> + Send>>;

/// Capability contract for dispatching completion requests.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Issue the request and await the full response.
    async fn call(
        &self,
        endpoint: &str,
        request: &CompletionRequest,
    ) -> Result<ProviderResponse, TransportError>;

    /// Issue the request and open a fragment stream.
    async fn open_stream(
        &self,
        endpoint: &str,
        request: &CompletionRequest,
    ) -> Result<FragmentStream, TransportError>;
}
