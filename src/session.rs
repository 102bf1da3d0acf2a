//! Chat session facade.
//!
//! A session owns one conversation plus the current provider/model
//! selection and streaming preference, and drives the engine for each
//! exchange. It is the surface a view layer talks to.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::conversation::Conversation;
use crate::engine::{CompletionEngine, EngineEvent, EventSender};
use crate::registry::{ProviderRegistry, RegistryError, Selection};
use crate::request::RequestBuilder;
use crate::settings::SettingsStore;
use crate::transport::ChatTransport;
use crate::types::{CompletionFailure, CompletionResult, ErrorKind, Message};

/// Errors raised while constructing or reconfiguring a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No provider offers a model to start from
    #[error("no provider with at least one model is configured")]
    NoProviders,

    /// A configured default did not resolve
    #[error(transparent)]
    Selection(#[from] RegistryError),
}

/// One conversation bound to a selection, settings, and an engine.
///
/// The expected usage is a single in-flight request per session. Methods
/// take `&self`; a view layer can hold the session behind an `Arc` and
/// call `cancel` while `send` is still running.
pub struct ChatSession {
    registry: Arc<ProviderRegistry>,
    settings: Arc<SettingsStore>,
    builder: RequestBuilder,
    engine: CompletionEngine,
    conversation: Conversation,
    selection: Mutex<Selection>,
    streaming: AtomicBool,
    in_flight: Mutex<Option<(u64, CancellationToken)>>,
    next_request_id: AtomicU64,
}

impl ChatSession {
    /// Session starting from the registry's first provider and model.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        settings: Arc<SettingsStore>,
        transport: Arc<dyn ChatTransport>,
    ) -> Result<Self, SessionError> {
        let selection = registry.first_selection().ok_or(SessionError::NoProviders)?;
        Ok(Self::assemble(registry, settings, transport, selection))
    }

    /// Session built from a loaded configuration.
    ///
    /// `default_provider` and `default_model` pick the initial selection;
    /// absent defaults fall back to the first provider and model.
    pub fn from_config(
        config: Config,
        transport: Arc<dyn ChatTransport>,
    ) -> Result<Self, SessionError> {
        let registry = Arc::new(ProviderRegistry::new(config.providers));

        let selection = match (&config.default_provider, &config.default_model) {
            (Some(provider), Some(model)) => registry.select(provider, model)?,
            (Some(provider), None) => {
                let profile = registry
                    .get(provider)
                    .ok_or_else(|| RegistryError::NotFound(provider.clone()))?;
                let model = profile
                    .models
                    .first()
                    .cloned()
                    .ok_or(SessionError::NoProviders)?;
                Selection {
                    provider: provider.clone(),
                    model,
                }
            }
            (None, default_model) => {
                if default_model.is_some() {
                    warn!("Ignoring default_model configured without default_provider");
                }
                registry.first_selection().ok_or(SessionError::NoProviders)?
            }
        };

        Ok(Self::assemble(
            registry,
            Arc::new(SettingsStore::new()),
            transport,
            selection,
        ))
    }

    fn assemble(
        registry: Arc<ProviderRegistry>,
        settings: Arc<SettingsStore>,
        transport: Arc<dyn ChatTransport>,
        selection: Selection,
    ) -> Self {
        let builder = RequestBuilder::new(registry.clone(), settings.clone());
        let engine = CompletionEngine::new(registry.clone(), transport);
        Self {
            registry,
            settings,
            builder,
            engine,
            conversation: Conversation::new(),
            selection: Mutex::new(selection),
            streaming: AtomicBool::new(true),
            in_flight: Mutex::new(None),
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Send one user message and run the exchange to a terminal outcome.
    ///
    /// The user message is appended first and stays in the transcript
    /// whatever the outcome. Success and failure outcomes append an
    /// assistant entry; cancellation appends nothing.
    pub async fn send(&self, content: &str) -> CompletionResult {
        self.send_inner(content, None).await
    }

    /// Like [`send`](Self::send), reporting engine events on `events`.
    pub async fn send_with_events(&self, content: &str, events: EventSender) -> CompletionResult {
        self.send_inner(content, Some(events)).await
    }

    async fn send_inner(&self, content: &str, events: Option<EventSender>) -> CompletionResult {
        let selection = self.selection();
        let streaming = self.streaming.load(Ordering::Relaxed);

        debug!(
            provider = %selection.provider,
            model = %selection.model,
            streaming,
            "Sending completion request"
        );
        self.conversation.append_user(content);

        let request = match self.builder.build(
            &self.conversation,
            &selection.provider,
            &selection.model,
            streaming,
        ) {
            Ok(request) => request,
            Err(err) => {
                let result = CompletionResult::Failure(CompletionFailure {
                    kind: ErrorKind::InvalidRequest,
                    attempts: 0,
                    detail: err.to_string(),
                });
                self.conversation
                    .append_assistant(&selection.provider, &selection.model, &result);
                if let Some(events) = &events {
                    let _ = events.send(EngineEvent::Failed {
                        kind: ErrorKind::InvalidRequest,
                    });
                }
                return result;
            }
        };

        let cancel = CancellationToken::new();
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner) =
            Some((request_id, cancel.clone()));

        let result = match events {
            Some(events) => {
                self.engine
                    .execute_with_events(&request, &cancel, events)
                    .await
            }
            None => self.engine.execute(&request, &cancel).await,
        };

        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            // A concurrent send may have replaced the token already.
            if let Some((owner, _)) = in_flight.as_ref()
                && *owner == request_id
            {
                *in_flight = None;
            }
        }

        self.conversation
            .append_assistant(&request.provider, &request.model, &result);
        result
    }

    /// Cancel the in-flight request, if any.
    pub fn cancel(&self) {
        let in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, cancel)) = in_flight.as_ref() {
            debug!("Cancelling in-flight request");
            cancel.cancel();
        }
    }

    /// Switch the session to a validated provider/model pair.
    ///
    /// An invalid pair leaves the current selection unchanged.
    pub fn select(&self, provider_id: &str, model_id: &str) -> Result<Selection, RegistryError> {
        let selection = self.registry.select(provider_id, model_id)?;
        *self
            .selection
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = selection.clone();
        debug!(provider = provider_id, model = model_id, "Selection changed");
        Ok(selection)
    }

    /// The current provider/model selection.
    pub fn selection(&self) -> Selection {
        self.selection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Choose between streamed and blocking dispatch for later sends.
    ///
    /// Sessions start with streaming enabled.
    pub fn set_streaming(&self, enabled: bool) {
        self.streaming.store(enabled, Ordering::Relaxed);
    }

    #[must_use]
    pub fn streaming(&self) -> bool {
        self.streaming.load(Ordering::Relaxed)
    }

    /// Drop the transcript and start over. Selection and settings persist.
    pub fn reset(&self) {
        self.conversation.reset();
    }

    /// The transcript in append order.
    pub fn messages(&self) -> Vec<Message> {
        self.conversation.snapshot()
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }
}
