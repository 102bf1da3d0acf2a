//! Completion execution engine.
//!
//! This module implements the per-request execution loop:
//! 1. Dispatch the request through the transport, blocking or streaming
//! 2. On failure, wait the provider's fixed retry delay and re-dispatch
//! 3. Stop on success, on a spent retry budget, or on cancellation
//!
//! Every request is an independent state machine instance; the engine
//! itself holds no per-request state between calls.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::registry::{ProviderConfig, ProviderRegistry};
use crate::transport::{ChatTransport, ProviderResponse, StreamFrame};
use crate::types::{
    Completion, CompletionFailure, CompletionRequest, CompletionResult, ErrorKind,
};

/// Observer events emitted while a request executes.
///
/// Events describe state transitions in order. Emission is best-effort:
/// a dropped receiver never stalls or fails the request.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A transport attempt is being issued. `attempt` starts at 1.
    Dispatching { attempt: u32 },
    /// An incremental piece of streamed content.
    Fragment { content: String },
    /// The previous attempt failed; the engine waits `delay`, then makes
    /// attempt `attempt`. Fragments from the failed attempt are superseded,
    /// the next attempt restarts the response from scratch.
    Retrying { attempt: u32, delay: Duration },
    /// Terminal: the full response was delivered.
    Succeeded,
    /// Terminal: the request failed and no retry budget remains.
    Failed { kind: ErrorKind },
    /// Terminal: the caller cancelled the request.
    Cancelled,
}

/// Sending half of an observer channel.
pub type EventSender = mpsc::UnboundedSender<EngineEvent>;

enum DispatchError {
    Cancelled,
    Failed { kind: ErrorKind, detail: String },
}

/// Executes completion requests against a transport.
///
/// Retry policy comes from the provider profile: a fixed delay between
/// attempts and at most `max_retries` re-dispatches after the first
/// failure. The delay never grows across attempts.
pub struct CompletionEngine {
    registry: Arc<ProviderRegistry>,
    transport: Arc<dyn ChatTransport>,
}

impl CompletionEngine {
    pub fn new(registry: Arc<ProviderRegistry>, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            registry,
            transport,
        }
    }

    /// Run one request to a terminal outcome.
    pub async fn execute(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> CompletionResult {
        self.run(request, cancel, None).await
    }

    /// Run one request, reporting state transitions on `events`.
    pub async fn execute_with_events(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
        events: EventSender,
    ) -> CompletionResult {
        self.run(request, cancel, Some(events)).await
    }

    async fn run(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
        events: Option<EventSender>,
    ) -> CompletionResult {
        if cancel.is_cancelled() {
            emit(&events, EngineEvent::Cancelled);
            return CompletionResult::Cancelled;
        }

        let Some(provider) = self.registry.get(&request.provider) else {
            let detail = format!("provider '{}' is not registered", request.provider);
            warn!(provider = %request.provider, "Rejecting request for unregistered provider");
            emit(&events, EngineEvent::Failed { kind: ErrorKind::InvalidRequest });
            return CompletionResult::Failure(CompletionFailure {
                kind: ErrorKind::InvalidRequest,
                attempts: 0,
                detail,
            });
        };

        if request.streaming && !provider.supports_streaming {
            let detail = format!("provider '{}' does not support streaming", provider.id);
            warn!(provider = %provider.id, "Rejecting streaming request");
            emit(&events, EngineEvent::Failed { kind: ErrorKind::UnsupportedFeature });
            return CompletionResult::Failure(CompletionFailure {
                kind: ErrorKind::UnsupportedFeature,
                attempts: 0,
                detail,
            });
        }

        let max_attempts = provider.max_retries.saturating_add(1);
        let retry_delay = Duration::from_millis(provider.retry_delay_ms);
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(
                provider = %provider.id,
                model = %request.model,
                attempt,
                max_attempts,
                streaming = request.streaming,
                "Dispatching completion request"
            );
            emit(&events, EngineEvent::Dispatching { attempt });

            let dispatched = if request.streaming {
                self.dispatch_streaming(&provider, request, cancel, &events)
                    .await
            } else {
                self.dispatch(&provider, request, cancel).await
            };

            match dispatched {
                Ok(response) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    debug!(provider = %provider.id, attempt, latency_ms, "Completion succeeded");
                    emit(&events, EngineEvent::Succeeded);
                    return CompletionResult::Success(Completion {
                        content: response.content,
                        token_count: response.token_count,
                        latency_ms,
                        raw_response: response.raw_response,
                    });
                }
                Err(DispatchError::Cancelled) => {
                    debug!(provider = %provider.id, attempt, "Completion cancelled");
                    emit(&events, EngineEvent::Cancelled);
                    return CompletionResult::Cancelled;
                }
                Err(DispatchError::Failed { kind, detail }) => {
                    warn!(
                        provider = %provider.id,
                        attempt,
                        max_attempts,
                        error = %detail,
                        "Completion attempt failed"
                    );

                    if attempt >= max_attempts {
                        emit(&events, EngineEvent::Failed { kind });
                        return CompletionResult::Failure(CompletionFailure {
                            kind,
                            attempts: attempt,
                            detail,
                        });
                    }

                    emit(
                        &events,
                        EngineEvent::Retrying {
                            attempt: attempt + 1,
                            delay: retry_delay,
                        },
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            debug!(provider = %provider.id, attempt, "Cancelled while waiting to retry");
                            emit(&events, EngineEvent::Cancelled);
                            return CompletionResult::Cancelled;
                        }
                        _ = tokio::time::sleep(retry_delay) => {}
                    }
                }
            }
        }
    }

    async fn dispatch(
        &self,
        provider: &ProviderConfig,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<ProviderResponse, DispatchError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DispatchError::Cancelled),
            result = self.transport.call(&provider.base_url, request) => {
                result.map_err(|err| DispatchError::Failed {
                    kind: ErrorKind::Transport,
                    detail: err.to_string(),
                })
            }
        }
    }

    async fn dispatch_streaming(
        &self,
        provider: &ProviderConfig,
        request: &CompletionRequest,
        cancel: &CancellationToken,
        events: &Option<EventSender>,
    ) -> Result<ProviderResponse, DispatchError> {
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
            opened = self.transport.open_stream(&provider.base_url, request) => {
                opened.map_err(|err| DispatchError::Failed {
                    kind: ErrorKind::Transport,
                    detail: err.to_string(),
                })?
            }
        };

        // Accumulate fragments; on any failure the partial content is
        // discarded and a retry restarts the full request.
        let mut content = String::new();
        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
                frame = stream.next() => frame,
            };

            match frame {
                Some(Ok(StreamFrame::Fragment(fragment))) => {
                    emit(events, EngineEvent::Fragment { content: fragment.clone() });
                    content.push_str(&fragment);
                }
                Some(Ok(StreamFrame::End(end))) => {
                    return Ok(ProviderResponse {
                        content,
                        token_count: end.token_count,
                        raw_response: end.raw_response,
                    });
                }
                Some(Err(err)) => {
                    return Err(DispatchError::Failed {
                        kind: ErrorKind::StreamInterrupted,
                        detail: err.to_string(),
                    });
                }
                None => {
                    return Err(DispatchError::Failed {
                        kind: ErrorKind::StreamInterrupted,
                        detail: "stream ended without an end-of-stream signal".to_string(),
                    });
                }
            }
        }
    }
}

fn emit(events: &Option<EventSender>, event: EngineEvent) {
    if let Some(sender) = events {
        let _ = sender.send(event);
    }
}
